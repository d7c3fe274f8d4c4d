use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Trained artifact missing, mismatched or corrupt
    #[error("Artifact load error: {0}")]
    ArtifactLoad(String),

    /// Training table unusable as a whole (no target column, no usable rows)
    #[error("Training data error: {0}")]
    TrainingData(String),

    /// Feature vector could not be fed to the classifiers
    #[error("Ensemble input error: {0}")]
    EnsembleInput(String),

    /// Score handed to the fusion engine outside [1, 5]
    #[error("Fusion range error: ml={ml}, external={external} (both must be in 1..=5)")]
    FusionRange { ml: i64, external: i64 },

    /// Model fitting or prediction failed inside the ML backend
    #[error("Model error: {0}")]
    Model(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::EnsembleInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::FusionRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TrainingData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ArtifactLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::ArtifactLoad(_) => "ARTIFACT_LOAD_ERROR",
            AppError::TrainingData(_) => "TRAINING_DATA_ERROR",
            AppError::EnsembleInput(_) => "ENSEMBLE_INPUT_ERROR",
            AppError::FusionRange { .. } => "FUSION_RANGE_ERROR",
            AppError::Model(_) => "MODEL_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Pipeline stage that failed, for per-request errors
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            AppError::EnsembleInput(_) => Some("ensemble_input"),
            AppError::FusionRange { .. } => Some("fusion"),
            AppError::Model(_) => Some("ensemble"),
            _ => None,
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();
        let stage = self.stage();

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_code])
            .inc();

        tracing::error!(
            error_code = error_code,
            status_code = status.as_u16(),
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16(),
                "stage": stage,
            }
        }));

        (status, body).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::FusionRange { ml: 0, external: 3 }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::ArtifactLoad("missing".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::EnsembleInput("width".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::EnsembleInput("width".to_string()).error_code(),
            "ENSEMBLE_INPUT_ERROR"
        );
        assert_eq!(
            AppError::FusionRange { ml: 6, external: 1 }.error_code(),
            "FUSION_RANGE_ERROR"
        );
        assert_eq!(
            AppError::TrainingData("empty".to_string()).error_code(),
            "TRAINING_DATA_ERROR"
        );
    }

    #[test]
    fn test_fusion_range_message_names_both_inputs() {
        let message = AppError::FusionRange { ml: 7, external: 2 }.to_string();
        assert!(message.contains("ml=7"));
        assert!(message.contains("external=2"));
    }
}
