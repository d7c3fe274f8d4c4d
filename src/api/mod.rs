pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::triage::InferenceContext;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<InferenceContext>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(context: Arc<InferenceContext>) -> Self {
        Self {
            context,
            started_at: Instant::now(),
        }
    }
}
