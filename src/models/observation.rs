use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

/// Raw patient record as collected at intake.
///
/// Numeric vitals are optional so that "not measured" stays distinguishable from
/// a measured value until feature encoding. Categorical fields keep the label the
/// intake form supplied; the feature encoder interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Observation {
    /// Age in years
    #[validate(range(min = 0.0, max = 120.0))]
    #[serde(default)]
    pub age: Option<f64>,

    /// Sex label ("male", "female", "unspecified")
    #[serde(default)]
    pub sex: Option<String>,

    /// Mode of arrival label ("walk", "public ambulance", ...)
    #[serde(default)]
    pub arrival_mode: Option<String>,

    /// Level of consciousness label ("alert", "verbal response", ...)
    #[serde(default)]
    pub consciousness: Option<String>,

    /// Self-reported pain on the 0-10 scale
    #[validate(range(min = 0, max = 10))]
    #[serde(default)]
    pub pain_level: Option<u8>,

    /// Free-text description of the presenting complaint
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub description: Option<String>,

    /// Systolic blood pressure (mmHg)
    #[validate(range(min = 50.0, max = 250.0))]
    #[serde(default)]
    pub systolic_bp: Option<f64>,

    /// Diastolic blood pressure (mmHg)
    #[validate(range(min = 30.0, max = 150.0))]
    #[serde(default)]
    pub diastolic_bp: Option<f64>,

    /// Heart rate (bpm)
    #[validate(range(min = 30.0, max = 200.0))]
    #[serde(default)]
    pub heart_rate: Option<f64>,

    /// Respiratory rate (breaths/min)
    #[validate(range(min = 4.0, max = 60.0))]
    #[serde(default)]
    pub respiratory_rate: Option<f64>,

    /// Peripheral oxygen saturation (%)
    #[validate(range(min = 50.0, max = 100.0))]
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,

    /// Body temperature with its unit
    #[serde(default)]
    pub body_temperature: Option<BodyTemperature>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_age(mut self, age: f64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_sex(mut self, sex: impl Into<String>) -> Self {
        self.sex = Some(sex.into());
        self
    }

    pub fn with_arrival_mode(mut self, mode: impl Into<String>) -> Self {
        self.arrival_mode = Some(mode.into());
        self
    }

    pub fn with_consciousness(mut self, level: impl Into<String>) -> Self {
        self.consciousness = Some(level.into());
        self
    }

    pub fn with_pain_level(mut self, pain: u8) -> Self {
        self.pain_level = Some(pain);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_blood_pressure(mut self, systolic: f64, diastolic: f64) -> Self {
        self.systolic_bp = Some(systolic);
        self.diastolic_bp = Some(diastolic);
        self
    }

    pub fn with_heart_rate(mut self, heart_rate: f64) -> Self {
        self.heart_rate = Some(heart_rate);
        self
    }

    pub fn with_respiratory_rate(mut self, respiratory_rate: f64) -> Self {
        self.respiratory_rate = Some(respiratory_rate);
        self
    }

    pub fn with_oxygen_saturation(mut self, saturation: f64) -> Self {
        self.oxygen_saturation = Some(saturation);
        self
    }

    pub fn with_temperature(mut self, temperature: BodyTemperature) -> Self {
        self.body_temperature = Some(temperature);
        self
    }
}

/// Body temperature reading tagged with its unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum BodyTemperature {
    Celsius(f64),
    Fahrenheit(f64),
}

impl BodyTemperature {
    /// Reading in degrees Celsius
    pub fn celsius(self) -> f64 {
        match self {
            BodyTemperature::Celsius(c) => c,
            BodyTemperature::Fahrenheit(f) => (f - 32.0) * 5.0 / 9.0,
        }
    }
}

/// Patient sex as coded for the classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    #[strum(to_string = "unspecified", serialize = "unknown", serialize = "other")]
    Unspecified,
    #[strum(to_string = "male", serialize = "m")]
    Male,
    #[strum(to_string = "female", serialize = "f")]
    Female,
}

impl Sex {
    pub fn code(self) -> f64 {
        match self {
            Sex::Unspecified => 0.0,
            Sex::Male => 1.0,
            Sex::Female => 2.0,
        }
    }
}

/// How the patient reached the emergency department
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalMode {
    #[strum(to_string = "unspecified", serialize = "unknown", serialize = "other")]
    Unspecified,
    #[strum(to_string = "walk", serialize = "walking", serialize = "walk in")]
    Walk,
    #[strum(to_string = "public ambulance", serialize = "ambulance")]
    PublicAmbulance,
    #[strum(to_string = "private vehicle", serialize = "car")]
    PrivateVehicle,
    #[strum(to_string = "private ambulance")]
    PrivateAmbulance,
}

impl ArrivalMode {
    pub fn code(self) -> f64 {
        match self {
            ArrivalMode::Unspecified => 0.0,
            ArrivalMode::Walk => 1.0,
            ArrivalMode::PublicAmbulance => 2.0,
            ArrivalMode::PrivateVehicle => 3.0,
            ArrivalMode::PrivateAmbulance => 4.0,
        }
    }
}

/// AVPU level of consciousness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Consciousness {
    #[strum(to_string = "unspecified", serialize = "unknown")]
    Unspecified,
    #[strum(to_string = "alert")]
    Alert,
    #[strum(to_string = "verbal response", serialize = "verbal")]
    VerbalResponse,
    #[strum(to_string = "pain response", serialize = "pain")]
    PainResponse,
    #[strum(to_string = "unresponsive")]
    Unresponsive,
}

impl Consciousness {
    pub fn code(self) -> f64 {
        match self {
            Consciousness::Unspecified => 0.0,
            Consciousness::Alert => 1.0,
            Consciousness::VerbalResponse => 2.0,
            Consciousness::PainResponse => 3.0,
            Consciousness::Unresponsive => 4.0,
        }
    }
}

/// Normalize an intake label before category lookup: separators become single spaces.
pub(crate) fn normalize_label(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_fahrenheit_conversion() {
        let t = BodyTemperature::Fahrenheit(98.6);
        assert!((t.celsius() - 37.0).abs() < 1e-9);
        assert_eq!(BodyTemperature::Celsius(36.4).celsius(), 36.4);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(Sex::from_str("FEMALE").unwrap(), Sex::Female);
        assert_eq!(
            ArrivalMode::from_str(&normalize_label("public_ambulance")).unwrap(),
            ArrivalMode::PublicAmbulance
        );
        assert_eq!(
            Consciousness::from_str(&normalize_label("  Verbal-Response ")).unwrap(),
            Consciousness::VerbalResponse
        );
        assert!(Sex::from_str("robot").is_err());
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(Sex::Male.code(), 1.0);
        assert_eq!(ArrivalMode::PrivateAmbulance.code(), 4.0);
        assert_eq!(Consciousness::Unresponsive.code(), 4.0);
        assert_eq!(Consciousness::Unspecified.code(), 0.0);
    }

    #[test]
    fn test_observation_deserializes_with_missing_fields() {
        let json = r#"{"sex": "male", "heart_rate": 72, "body_temperature": {"unit": "fahrenheit", "value": 100.4}}"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.sex.as_deref(), Some("male"));
        assert_eq!(obs.heart_rate, Some(72.0));
        assert!(obs.systolic_bp.is_none());
        assert_eq!(obs.body_temperature, Some(BodyTemperature::Fahrenheit(100.4)));
    }

    #[test]
    fn test_pain_level_validation() {
        let obs = Observation::new().with_pain_level(11);
        assert!(obs.validate().is_err());
        assert!(Observation::new().with_pain_level(10).validate().is_ok());
    }

    #[test]
    fn test_vital_ranges() {
        let impossible = Observation::new()
            .with_blood_pressure(-500.0, 9000.0)
            .with_heart_rate(-3.0)
            .with_respiratory_rate(-10.0)
            .with_age(125.0);
        let errors = impossible.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["systolic_bp", "diastolic_bp", "heart_rate", "respiratory_rate", "age"] {
            assert!(fields.contains_key(field), "{} not rejected", field);
        }

        assert!(Observation::new().with_oxygen_saturation(20.0).validate().is_err());

        let plausible = Observation::new()
            .with_age(67.0)
            .with_blood_pressure(110.0, 70.0)
            .with_heart_rate(90.0)
            .with_respiratory_rate(18.0)
            .with_oxygen_saturation(97.0);
        assert!(plausible.validate().is_ok());
    }
}
