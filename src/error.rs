use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Model artifact missing, corrupt or incompatible
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// An input value could not be coerced to a number
    #[error("Schema mismatch: field '{field}' has non-numeric value '{value}'")]
    SchemaMismatch { field: String, value: String },

    /// Expected label missing from a class distribution
    #[error("Label not found in class distribution: {0}")]
    LabelNotFound(String),

    /// Classifier lacks an optional capability
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

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
            AppError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::LabelNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::CapabilityUnavailable(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            AppError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            AppError::LabelNotFound(_) => "LABEL_NOT_FOUND",
            AppError::CapabilityUnavailable(_) => "CAPABILITY_UNAVAILABLE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Name of the offending input field, if the error is tied to one
    pub fn field(&self) -> Option<&str> {
        match self {
            AppError::SchemaMismatch { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code().to_string();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = %error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(
                error_code = %error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request rejected"
            );
        }

        let mut error = json!({
            "code": error_code,
            "message": message,
            "status": status.as_u16(),
        });
        if let Some(field) = self.field() {
            error["field"] = json!(field);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from axum's JSON body rejection
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
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
            AppError::SchemaMismatch {
                field: "Torque [Nm]".to_string(),
                value: "abc".to_string()
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::ModelUnavailable("missing".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::LabelNotFound("No Failure".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::LabelNotFound("No Failure".to_string()).error_code(),
            "LABEL_NOT_FOUND"
        );
        assert_eq!(
            AppError::CapabilityUnavailable("predict_proba".to_string()).error_code(),
            "CAPABILITY_UNAVAILABLE"
        );
        assert_eq!(
            AppError::ModelUnavailable("x".to_string()).error_code(),
            "MODEL_UNAVAILABLE"
        );
    }

    #[test]
    fn test_schema_mismatch_names_field() {
        let err = AppError::SchemaMismatch {
            field: "Tool wear [min]".to_string(),
            value: "lots".to_string(),
        };
        assert_eq!(err.field(), Some("Tool wear [min]"));
        assert!(err.to_string().contains("Tool wear [min]"));
        assert!(err.to_string().contains("lots"));
        assert_eq!(AppError::Internal("x".to_string()).field(), None);
    }
}
