/// External severity assessor
///
/// The assessor is a black box that reads a plain-text case description and
/// answers `"<digit>;<rationale>"`. This module provides:
/// - The `SeverityAssessor` seam and its error type
/// - A strict parser for the response contract
/// - An HTTP client for OpenAI-compatible chat completion endpoints
/// - A fixed-response assessor for offline use

pub mod http;
pub mod parser;

pub use http::HttpSeverityAssessor;
pub use parser::{parse_assessment, AssessmentParseError, ExternalAssessment, SEPARATOR};

use crate::models::Observation;
use async_trait::async_trait;
use std::fmt::Write;
use std::time::Duration;
use thiserror::Error;

/// Assessor failure; every variant leaves the request answerable from the ML score alone
#[derive(Debug, Clone, Error)]
pub enum AssessorError {
    /// Transport failure, non-success status or unusable envelope
    #[error("assessor unavailable: {0}")]
    Unavailable(String),

    #[error("assessor did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed assessor response: {0}")]
    MalformedResponse(#[from] AssessmentParseError),
}

impl AssessorError {
    /// Stable label used in reports and metrics
    pub fn stage(&self) -> &'static str {
        match self {
            AssessorError::Unavailable(_) => "assessor_unavailable",
            AssessorError::Timeout(_) => "assessor_timeout",
            AssessorError::MalformedResponse(_) => "assessor_malformed_response",
        }
    }
}

/// Source of the external severity opinion
#[async_trait]
pub trait SeverityAssessor: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Raw response text for one case description
    async fn assess(&self, case_description: &str) -> Result<String, AssessorError>;
}

/// Answers every case with the same response text
#[derive(Debug, Clone)]
pub struct StaticAssessor {
    response: String,
}

impl StaticAssessor {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl SeverityAssessor for StaticAssessor {
    fn name(&self) -> &str {
        "static"
    }

    async fn assess(&self, _case_description: &str) -> Result<String, AssessorError> {
        Ok(self.response.clone())
    }
}

/// Plain-text summary of an observation; absent fields are left out
pub fn case_description(observation: &Observation) -> String {
    let mut out = String::new();

    let mut line = |label: &str, value: String| {
        let _ = writeln!(out, "{}: {}", label, value);
    };

    if let Some(age) = observation.age {
        line("Age", format!("{}", age));
    }
    if let Some(sex) = &observation.sex {
        line("Sex", sex.clone());
    }
    if let Some(mode) = &observation.arrival_mode {
        line("Arrival mode", mode.clone());
    }
    if let Some(level) = &observation.consciousness {
        line("Consciousness", level.clone());
    }
    if let Some(pain) = observation.pain_level {
        line("Pain (0-10)", pain.to_string());
    }
    if let (Some(sbp), Some(dbp)) = (observation.systolic_bp, observation.diastolic_bp) {
        line("Blood pressure", format!("{}/{} mmHg", sbp, dbp));
    }
    if let Some(hr) = observation.heart_rate {
        line("Heart rate", format!("{} bpm", hr));
    }
    if let Some(rr) = observation.respiratory_rate {
        line("Respiratory rate", format!("{} /min", rr));
    }
    if let Some(spo2) = observation.oxygen_saturation {
        line("Oxygen saturation", format!("{}%", spo2));
    }
    if let Some(temp) = observation.body_temperature {
        line("Body temperature", format!("{:.1} C", temp.celsius()));
    }
    if let Some(text) = observation.description.as_deref().filter(|t| !t.trim().is_empty()) {
        line("Presentation", text.trim().to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BodyTemperature;

    #[tokio::test]
    async fn test_static_assessor() {
        let assessor = StaticAssessor::new("2;chest pain");
        assert_eq!(assessor.assess("anything").await.unwrap(), "2;chest pain");
    }

    #[test]
    fn test_error_stages() {
        assert_eq!(
            AssessorError::Unavailable("down".into()).stage(),
            "assessor_unavailable"
        );
        assert_eq!(
            AssessorError::Timeout(Duration::from_secs(1)).stage(),
            "assessor_timeout"
        );
        let malformed: AssessorError = AssessmentParseError::Empty.into();
        assert_eq!(malformed.stage(), "assessor_malformed_response");
    }

    #[test]
    fn test_case_description() {
        let obs = Observation::new()
            .with_age(67.0)
            .with_sex("female")
            .with_blood_pressure(110.0, 70.0)
            .with_temperature(BodyTemperature::Fahrenheit(98.6))
            .with_description("  fell down the stairs ");
        let text = case_description(&obs);

        assert!(text.contains("Age: 67\n"));
        assert!(text.contains("Sex: female\n"));
        assert!(text.contains("Blood pressure: 110/70 mmHg\n"));
        assert!(text.contains("Body temperature: 37.0 C\n"));
        assert!(text.contains("Presentation: fell down the stairs\n"));
        assert!(!text.contains("Heart rate"));
    }
}
