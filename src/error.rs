use axum::http::StatusCode;
use thiserror::Error;

/// Failures of a single gender reveal request.
///
/// Every collaborator maps its own failures onto exactly one variant, so the
/// HTTP layer can report which stage broke without inspecting messages.
#[derive(Error, Debug)]
pub enum RevealError {
    #[error("segment [{start}, {end}) is out of range for text of {len} characters")]
    OutOfRange { start: usize, end: usize, len: usize },

    #[error("classifier answered {0:?}, expected \"male\" or \"female\"")]
    UnexpectedLabel(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("storage fetch error: {0}")]
    StorageFetch(String),

    #[error("document parse error: {0}")]
    Parse(String),

    #[error("classification error: {0}")]
    Classification(String),
}

impl RevealError {
    /// Stable machine-readable code used in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RevealError::OutOfRange { .. } => "out_of_range",
            RevealError::UnexpectedLabel(_) => "unexpected_label",
            RevealError::Credential(_) => "credential_error",
            RevealError::StorageFetch(_) => "storage_fetch_error",
            RevealError::Parse(_) => "parse_error",
            RevealError::Classification(_) => "classification_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RevealError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
