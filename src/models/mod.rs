pub mod observation;
pub mod score;

pub use observation::*;
pub use score::*;
