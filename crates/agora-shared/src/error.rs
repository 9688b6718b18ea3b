use thiserror::Error;

/// Errors reported by a backend collaborator.
///
/// Every capability in [`crate::backend`] fails with this type, whatever the
/// transport behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Record not found")]
    NotFound,

    #[error("Not signed in")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

/// Input rejected locally, before any remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("File is empty")]
    EmptyFile,

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },
}
