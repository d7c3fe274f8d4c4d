use crate::models::{ArrivalMode, Consciousness, Observation, Sex};
use crate::models::observation::normalize_label;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{trace, warn};

pub const SEX: &str = "Sex";
pub const AGE: &str = "Age";
pub const ARRIVAL_MODE: &str = "Arrival mode";
pub const INJURY: &str = "Injury";
pub const MENTAL: &str = "Mental";
pub const PAIN: &str = "Pain";
pub const SBP: &str = "SBP";
pub const DBP: &str = "DBP";
pub const HR: &str = "HR";
pub const RR: &str = "RR";
pub const BT: &str = "BT";
pub const SATURATION: &str = "Saturation";

/// Column order of the reference triage dataset
pub const DEFAULT_FEATURE_ORDER: [&str; 10] = [
    SEX,
    ARRIVAL_MODE,
    INJURY,
    MENTAL,
    PAIN,
    SBP,
    DBP,
    HR,
    RR,
    BT,
];

/// Value used for a missing vital or an artifact column the encoder does not produce
pub const MISSING_VALUE: f64 = 0.0;

/// Intake label that could not be mapped to a known category.
///
/// Not fatal: the field falls back to its "unspecified" code and the request continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("unrecognized {field} value '{value}', using the unspecified code")]
pub struct EncodingIssue {
    pub field: String,
    pub value: String,
}

/// Feature values in the artifact's column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Vec<f64>);

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(&self.0[..])
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.0.clone())
    }
}

/// Result of encoding one observation against a column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedObservation {
    /// Values in the requested column order
    pub vector: FeatureVector,

    /// Categorical labels that fell back to the unspecified code
    pub issues: Vec<EncodingIssue>,

    /// Columns whose value was not supplied and was filled with `MISSING_VALUE`
    pub imputed: Vec<String>,
}

/// Deterministic mapping from raw observation fields to model columns
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode and reindex to `feature_names`.
    ///
    /// Always reindexes, even when the produced columns already match: columns
    /// absent from the encoder output are filled with `MISSING_VALUE`, produced
    /// columns absent from `feature_names` are dropped.
    pub fn encode(&self, observation: &Observation, feature_names: &[String]) -> EncodedObservation {
        let mut issues = Vec::new();
        let mut imputed = Vec::new();
        let columns = self.encode_columns(observation, &mut issues);

        let values = feature_names
            .iter()
            .map(|name| match columns.iter().find(|(col, _)| *col == name.as_str()) {
                Some((_, Some(value))) => *value,
                Some((_, None)) => {
                    imputed.push(name.clone());
                    MISSING_VALUE
                }
                None => {
                    trace!(column = %name, "Column not produced by encoder, filling default");
                    imputed.push(name.clone());
                    MISSING_VALUE
                }
            })
            .collect();

        for (col, _) in &columns {
            if !feature_names.iter().any(|n| n == col) {
                trace!(column = col, "Dropping column unknown to the model");
            }
        }

        EncodedObservation {
            vector: FeatureVector(values),
            issues,
            imputed,
        }
    }

    /// Every column the encoder knows how to produce; `None` marks an absent vital
    pub fn encode_columns(
        &self,
        observation: &Observation,
        issues: &mut Vec<EncodingIssue>,
    ) -> Vec<(&'static str, Option<f64>)> {
        let sex = parse_category::<Sex>("sex", observation.sex.as_deref(), issues)
            .unwrap_or(Sex::Unspecified);
        let arrival = parse_category::<ArrivalMode>(
            "arrival_mode",
            observation.arrival_mode.as_deref(),
            issues,
        )
        .unwrap_or(ArrivalMode::Unspecified);
        let mental = parse_category::<Consciousness>(
            "consciousness",
            observation.consciousness.as_deref(),
            issues,
        )
        .unwrap_or(Consciousness::Unspecified);

        vec![
            (SEX, Some(sex.code())),
            (AGE, observation.age),
            (ARRIVAL_MODE, Some(arrival.code())),
            (INJURY, Some(injury_flag(observation.description.as_deref()))),
            (MENTAL, Some(mental.code())),
            (PAIN, Some(pain_code(observation.pain_level))),
            (SBP, observation.systolic_bp),
            (DBP, observation.diastolic_bp),
            (HR, observation.heart_rate),
            (RR, observation.respiratory_rate),
            (BT, observation.body_temperature.map(|t| t.celsius())),
            (SATURATION, observation.oxygen_saturation),
        ]
    }
}

/// Pain collapsed to two levels: 2 for significant pain (>= 3), 1 for mild or none
pub fn pain_code(pain_level: Option<u8>) -> f64 {
    match pain_level {
        Some(p) if p >= 3 => 2.0,
        _ => 1.0,
    }
}

/// 2 when the description mentions an injury ("injur" in any case), else 1
pub fn injury_flag(description: Option<&str>) -> f64 {
    match description {
        Some(text) if text.to_lowercase().contains("injur") => 2.0,
        _ => 1.0,
    }
}

fn parse_category<T: FromStr>(
    field: &str,
    raw: Option<&str>,
    issues: &mut Vec<EncodingIssue>,
) -> Option<T> {
    let raw = raw?;
    let label = normalize_label(raw);
    if label.is_empty() {
        return None;
    }

    match T::from_str(&label) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(field, value = raw, "Unrecognized category, using unspecified code");
            crate::metrics::ENCODING_FALLBACKS_TOTAL
                .with_label_values(&[field])
                .inc();
            issues.push(EncodingIssue {
                field: field.to_string(),
                value: raw.to_string(),
            });
            None
        }
    }
}
