use crate::models::TriageScore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the score and the rationale in an assessor response
pub const SEPARATOR: char = ';';

/// A well-formed assessor opinion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAssessment {
    pub score: TriageScore,
    pub rationale: String,
}

/// Why an assessor response was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AssessmentParseError {
    #[error("response is empty")]
    Empty,

    #[error("expected exactly one '{SEPARATOR}' separator, found {found}")]
    SeparatorCount { found: usize },

    #[error("leading token '{token}' is not a single digit")]
    NotAnInteger { token: String },

    #[error("score {score} is outside 1..=5")]
    ScoreOutOfRange { score: i64 },
}

/// Parse a `"<digit>;<rationale>"` response.
///
/// The leading token is trimmed and must then be exactly one ASCII digit, so signs and
/// leading zeros are rejected. The rationale is trimmed and may be empty.
pub fn parse_assessment(response: &str) -> Result<ExternalAssessment, AssessmentParseError> {
    let response = response.trim();
    if response.is_empty() {
        return Err(AssessmentParseError::Empty);
    }

    let found = response.matches(SEPARATOR).count();
    let (token, rationale) = match response.split_once(SEPARATOR) {
        Some(parts) if found == 1 => parts,
        _ => return Err(AssessmentParseError::SeparatorCount { found }),
    };

    let token = token.trim();
    let score = match token.as_bytes() {
        [digit] if digit.is_ascii_digit() => i64::from(digit - b'0'),
        _ => {
            return Err(AssessmentParseError::NotAnInteger {
                token: token.to_string(),
            })
        }
    };
    let score = TriageScore::new(score).map_err(|_| AssessmentParseError::ScoreOutOfRange { score })?;

    Ok(ExternalAssessment {
        score,
        rationale: rationale.trim().to_string(),
    })
}
