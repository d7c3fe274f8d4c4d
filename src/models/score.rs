use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of triage classes (scores 1 through 5)
pub const N_TRIAGE_CLASSES: usize = 5;

/// Clinical urgency score: 1 is the most critical, 5 the least.
///
/// The only way to obtain a value is through validation, so a `TriageScore`
/// held anywhere in the crate is always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct TriageScore(u8);

/// Raw value rejected by `TriageScore` validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("triage score {0} is outside 1..=5")]
pub struct ScoreOutOfRange(pub i64);

impl TriageScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Validate a raw integer score
    pub fn new(value: i64) -> Result<Self, ScoreOutOfRange> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreOutOfRange(value))
        }
    }

    /// Convert a zero-based class label (as used by the classifiers) back to a score
    pub fn from_label(label: usize) -> Result<Self, ScoreOutOfRange> {
        Self::new(label as i64 + 1)
    }

    /// Zero-based class label used internally by the classifiers
    pub fn label(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for TriageScore {
    type Error = ScoreOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TriageScore> for u8 {
    fn from(score: TriageScore) -> Self {
        score.0
    }
}

impl From<TriageScore> for i64 {
    fn from(score: TriageScore) -> Self {
        score.0 as i64
    }
}

impl fmt::Display for TriageScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        for value in 1..=5 {
            assert_eq!(TriageScore::new(value).unwrap().value() as i64, value);
        }
        assert_eq!(TriageScore::new(0), Err(ScoreOutOfRange(0)));
        assert_eq!(TriageScore::new(6), Err(ScoreOutOfRange(6)));
        assert!(TriageScore::new(-1).is_err());
    }

    #[test]
    fn test_label_rebasing() {
        let score = TriageScore::new(1).unwrap();
        assert_eq!(score.label(), 0);
        assert_eq!(TriageScore::from_label(4).unwrap().value(), 5);
        assert!(TriageScore::from_label(5).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let score: TriageScore = serde_json::from_str("3").unwrap();
        assert_eq!(score.value(), 3);
        assert_eq!(serde_json::to_string(&score).unwrap(), "3");
        assert!(serde_json::from_str::<TriageScore>("9").is_err());
    }
}
