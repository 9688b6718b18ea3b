use std::time::Duration;

use thiserror::Error;

use agora_shared::{BackendError, ValidationError};

/// Failures of controller and pipeline operations.
///
/// Every variant is recoverable: the caller shows a notice and the user
/// retries, corrects input, or signs in.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Please sign in first")]
    Unauthenticated,

    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("{0}")]
    Remote(#[from] BackendError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The binary reached storage but its metadata record was not created.
    #[error("Uploaded {bucket}/{key} but saving its record failed: {source}")]
    PartialUpload {
        bucket: String,
        key: String,
        /// Whether the orphaned object was removed again.
        removed: bool,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Unexpected row shape: {0}")]
    Decode(String),
}

impl SyncError {
    /// Short category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation",
            SyncError::Unauthenticated | SyncError::NotPermitted(_) => "authorization",
            SyncError::Remote(_) | SyncError::Timeout(_) | SyncError::Decode(_) => "remote",
            SyncError::PartialUpload { .. } => "partial",
        }
    }
}
