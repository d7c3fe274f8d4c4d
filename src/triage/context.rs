use crate::assessor::{case_description, parse_assessment, AssessorError, ExternalAssessment, SeverityAssessor};
use crate::error::{AppError, Result};
use crate::fusion::{FusionEngine, FusionResult};
use crate::metrics::{
    ASSESSOR_DURATION_SECONDS, ASSESSOR_REQUESTS_TOTAL, ENSEMBLE_VOTES_TOTAL,
    STAGE_DURATION_SECONDS, TRIAGE_DURATION_SECONDS, TRIAGE_REQUESTS_TOTAL,
};
use crate::ml::{EncodingIssue, FeatureEncoder, ModelArtifact, ModelType};
use crate::models::{Observation, TriageScore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::{AsRefStr, Display};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One base classifier's vote, as a triage score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterScore {
    pub model: ModelType,
    pub score: TriageScore,
}

/// ML-side result for one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub score: TriageScore,
    pub votes: Vec<VoterScore>,
    pub encoding_issues: Vec<EncodingIssue>,

    /// Artifact columns filled with the missing-value default
    pub imputed_features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriageStatus {
    /// Both scores available and fused
    Fused,
    /// Assessor failed; the recommendation is the ML score alone
    Degraded,
}

/// Why the assessor side was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
}

impl From<&AssessorError> for StageFailure {
    fn from(err: &AssessorError) -> Self {
        Self {
            stage: err.stage().to_string(),
            message: err.to_string(),
        }
    }
}

/// Full answer to one triage request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    pub request_id: Uuid,
    pub model_run_id: Uuid,
    pub status: TriageStatus,
    pub recommended_score: TriageScore,
    pub ml: MlPrediction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalAssessment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fusion: Option<FusionResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

impl TriageReport {
    pub fn is_degraded(&self) -> bool {
        self.status == TriageStatus::Degraded
    }
}

/// Everything a triage request needs, built once and handed to each handler.
///
/// The artifact is read-only after load, so the context is cheap to clone and
/// safe to share across concurrent requests.
#[derive(Clone)]
pub struct InferenceContext {
    artifact: Arc<ModelArtifact>,
    assessor: Arc<dyn SeverityAssessor>,
    encoder: FeatureEncoder,
    fusion: FusionEngine,
    assessor_timeout: Duration,
}

impl InferenceContext {
    pub fn new(
        artifact: Arc<ModelArtifact>,
        assessor: Arc<dyn SeverityAssessor>,
        assessor_timeout: Duration,
    ) -> Self {
        Self {
            artifact,
            assessor,
            encoder: FeatureEncoder::new(),
            fusion: FusionEngine::new(),
            assessor_timeout,
        }
    }

    pub fn artifact(&self) -> &Arc<ModelArtifact> {
        &self.artifact
    }

    pub fn assessor_timeout(&self) -> Duration {
        self.assessor_timeout
    }

    /// Encode, scale and vote
    pub fn predict_ml(&self, observation: &Observation) -> Result<MlPrediction> {
        let start = Instant::now();
        let encoded = self.encoder.encode(observation, self.artifact.feature_names());
        STAGE_DURATION_SECONDS
            .with_label_values(&["encode"])
            .observe(start.elapsed().as_secs_f64());

        if !encoded.imputed.is_empty() {
            debug!(columns = ?encoded.imputed, "Filled missing feature values");
        }

        let start = Instant::now();
        let ballot = self.artifact.ballot(&encoded.vector)?;
        STAGE_DURATION_SECONDS
            .with_label_values(&["ensemble"])
            .observe(start.elapsed().as_secs_f64());

        let score = label_to_score(ballot.decision)?;
        let votes = ballot
            .votes
            .iter()
            .map(|(model, label)| -> Result<VoterScore> {
                Ok(VoterScore {
                    model: *model,
                    score: label_to_score(*label)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let score_label = score.to_string();
        ENSEMBLE_VOTES_TOTAL
            .with_label_values(&[score_label.as_str()])
            .inc();

        Ok(MlPrediction {
            score,
            votes,
            encoding_issues: encoded.issues,
            imputed_features: encoded.imputed,
        })
    }

    /// Ask the assessor, bounded by the configured timeout, and parse its answer
    pub async fn assess(&self, case_description: &str) -> std::result::Result<ExternalAssessment, AssessorError> {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(
            self.assessor_timeout,
            self.assessor.assess(case_description),
        )
        .await
        {
            Ok(Ok(raw)) => parse_assessment(&raw).map_err(AssessorError::from),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AssessorError::Timeout(self.assessor_timeout)),
        };

        let elapsed = start.elapsed().as_secs_f64();
        ASSESSOR_DURATION_SECONDS.observe(elapsed);
        STAGE_DURATION_SECONDS
            .with_label_values(&["assessor"])
            .observe(elapsed);

        let status = match &outcome {
            Ok(_) => "success",
            Err(AssessorError::Unavailable(_)) => "unavailable",
            Err(AssessorError::Timeout(_)) => "timeout",
            Err(AssessorError::MalformedResponse(_)) => "malformed_response",
        };
        ASSESSOR_REQUESTS_TOTAL.with_label_values(&[status]).inc();

        if let Err(e) = &outcome {
            warn!(assessor = self.assessor.name(), stage = e.stage(), error = %e, "Assessor failed");
        }
        outcome
    }

    /// Run the ML path and the assessor concurrently, then fuse.
    ///
    /// An assessor failure of any kind degrades the report to the ML score;
    /// an ML failure fails the request.
    #[instrument(skip(self, observation), fields(request_id = tracing::field::Empty))]
    pub async fn triage(&self, observation: &Observation) -> Result<TriageReport> {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let description = case_description(observation);

        let ml_context = self.clone();
        let ml_observation = observation.clone();
        let ml_task = tokio::task::spawn_blocking(move || ml_context.predict_ml(&ml_observation));

        let (ml_joined, external) = tokio::join!(ml_task, self.assess(&description));

        let ml = match ml_joined
            .map_err(|e| AppError::Internal(format!("ML task failed: {}", e)))
            .and_then(|r| r)
        {
            Ok(ml) => ml,
            Err(e) => {
                TRIAGE_REQUESTS_TOTAL.with_label_values(&["failed"]).inc();
                return Err(e);
            }
        };

        let report = match external {
            Ok(assessment) => {
                let fusion_start = Instant::now();
                let fusion = self
                    .fusion
                    .combine(ml.score, assessment.score, assessment.rationale.clone());
                STAGE_DURATION_SECONDS
                    .with_label_values(&["fusion"])
                    .observe(fusion_start.elapsed().as_secs_f64());

                let fusion = match fusion {
                    Ok(f) => f,
                    Err(e) => {
                        TRIAGE_REQUESTS_TOTAL.with_label_values(&["failed"]).inc();
                        return Err(e);
                    }
                };

                TriageReport {
                    request_id,
                    model_run_id: self.artifact.run_id(),
                    status: TriageStatus::Fused,
                    recommended_score: fusion.recommended_score,
                    ml,
                    external: Some(assessment),
                    fusion: Some(fusion),
                    failure: None,
                }
            }
            Err(e) => TriageReport {
                request_id,
                model_run_id: self.artifact.run_id(),
                status: TriageStatus::Degraded,
                recommended_score: ml.score,
                ml,
                external: None,
                fusion: None,
                failure: Some(StageFailure::from(&e)),
            },
        };

        TRIAGE_REQUESTS_TOTAL
            .with_label_values(&[report.status.as_ref()])
            .inc();
        TRIAGE_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        info!(
            status = %report.status,
            recommended = %report.recommended_score,
            ml = %report.ml.score,
            external = ?report.external.as_ref().map(|a| a.score.value()),
            "Triage complete"
        );

        Ok(report)
    }
}

fn label_to_score(label: usize) -> Result<TriageScore> {
    TriageScore::from_label(label)
        .map_err(|e| AppError::Model(format!("classifier produced an invalid label: {}", e)))
}
