//! Emergency triage decision engine.
//!
//! An ensemble of three classifiers scores encoded patient vitals; the score
//! is fused with an external severity opinion into one recommendation.

pub mod api;
pub mod assessor;
pub mod config;
pub mod error;
pub mod fusion;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod triage;

pub use error::{AppError, Result};
