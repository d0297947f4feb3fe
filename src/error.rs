//! Error taxonomy for the report processing pipeline.
//!
//! Every failure a request can hit maps onto one [`ProcessingError`] variant,
//! which in turn decides the HTTP status and the message placed in the
//! response envelope.

use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

/// A single schema violation found while validating model output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldViolation {
    /// Path of the offending field, e.g. `drugs_administered[1].drug_name`.
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    // ── Client input ──────────────────────────────────────────────────────
    /// Missing, empty or non-PDF upload.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// OCR produced no usable text.
    #[error("Failed to extract text from PDF: document is empty")]
    EmptyDocument,

    #[error("Unsupported report type '{0}' (expected 'therapy' or 'radiation')")]
    UnsupportedReportType(String),

    // ── External services ─────────────────────────────────────────────────
    /// The OCR call failed (network, HTTP status, undecodable response).
    #[error("OCR service error: {0}")]
    OcrService(String),

    /// The language model call failed.
    #[error("Language model service error: {0}")]
    ModelService(String),

    /// The model answered, but no JSON object could be recovered from it.
    #[error("Malformed model response: {0}")]
    MalformedModelResponse(String),

    /// The recovered JSON does not satisfy the report schema.
    #[error("Schema validation failed: {}", join_violations(.violations))]
    SchemaValidation { violations: Vec<FieldViolation> },

    // ── Local ─────────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProcessingError {
    /// Short machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::EmptyDocument => "empty_document",
            Self::UnsupportedReportType(_) => "unsupported_report_type",
            Self::OcrService(_) => "ocr_service",
            Self::ModelService(_) => "model_service",
            Self::MalformedModelResponse(_) => "malformed_model_response",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::Internal(_) => "internal",
        }
    }

    /// Failures caused by what the caller sent, as opposed to by us or a
    /// downstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::EmptyDocument | Self::UnsupportedReportType(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<std::io::Error> for ProcessingError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        for err in [
            ProcessingError::InvalidInput("no file".into()),
            ProcessingError::EmptyDocument,
            ProcessingError::UnsupportedReportType("xray".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{}", err.kind());
        }
    }

    #[test]
    fn test_service_errors_map_to_500() {
        for err in [
            ProcessingError::OcrService("timed out".into()),
            ProcessingError::ModelService("503".into()),
            ProcessingError::MalformedModelResponse("no json".into()),
            ProcessingError::SchemaValidation { violations: vec![] },
            ProcessingError::Internal("disk full".into()),
        ] {
            assert_eq!(
                err.status_code(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "{}",
                err.kind()
            );
        }
    }

    #[test]
    fn test_schema_validation_message_lists_fields() {
        let err = ProcessingError::SchemaValidation {
            violations: vec![
                FieldViolation::new("fractions", "field required"),
                FieldViolation::new("start_date", "expected date in YYYY-MM-DD format"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("fractions: field required"));
        assert!(msg.contains("start_date: expected date"));
    }
}
