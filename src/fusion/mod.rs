//! Fusion of the ML score with the external assessor's score
//!
//! `recommended = round(0.75 * external + 0.25 * ml)`, rounding halves away
//! from zero. Both inputs must already be valid triage scores; anything else
//! is rejected rather than clamped.

use crate::error::{AppError, Result};
use crate::models::TriageScore;
use serde::{Deserialize, Serialize};

/// Weight of the external assessor's score
pub const EXTERNAL_WEIGHT: f64 = 0.75;

/// Weight of the ensemble's score
pub const ML_WEIGHT: f64 = 0.25;

/// Outcome of fusing both scores for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionResult {
    pub ml_score: TriageScore,
    pub external_score: TriageScore,
    pub recommended_score: TriageScore,

    /// The assessor's free-text rationale
    pub rationale: String,
}

/// Fixed-weight combination of the two scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionEngine {
    external_weight: f64,
    ml_weight: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            external_weight: EXTERNAL_WEIGHT,
            ml_weight: ML_WEIGHT,
        }
    }
}

impl FusionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuse two raw integer scores, failing if either is outside 1..=5
    pub fn fuse(&self, ml: i64, external: i64) -> Result<TriageScore> {
        let (ml_score, external_score) = match (TriageScore::new(ml), TriageScore::new(external)) {
            (Ok(m), Ok(e)) => (m, e),
            _ => return Err(AppError::FusionRange { ml, external }),
        };
        self.fuse_scores(ml_score, external_score)
    }

    /// Fuse two validated scores
    pub fn fuse_scores(&self, ml: TriageScore, external: TriageScore) -> Result<TriageScore> {
        let weighted = self.external_weight * f64::from(external.value())
            + self.ml_weight * f64::from(ml.value());

        // f64::round rounds halves away from zero
        let rounded = weighted.round() as i64;
        TriageScore::new(rounded).map_err(|_| AppError::FusionRange {
            ml: ml.into(),
            external: external.into(),
        })
    }

    pub fn combine(
        &self,
        ml: TriageScore,
        external: TriageScore,
        rationale: impl Into<String>,
    ) -> Result<FusionResult> {
        Ok(FusionResult {
            ml_score: ml,
            external_score: external,
            recommended_score: self.fuse_scores(ml, external)?,
            rationale: rationale.into(),
        })
    }
}
