//! Two-step publishing of binary content: store the object, then create the
//! record that points at it.
//!
//! The two steps are not atomic. When the record cannot be created the
//! caller gets [`SyncError::PartialUpload`] so the orphaned object can be
//! told apart from a plain failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use agora_shared::models::{Draft, Record};
use agora_shared::{Backend, User, UserId, ValidationError};

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::events::Notices;
use crate::sync_list::{bounded, SyncList};

/// A payload that passed local checks and has its storage key assigned.
#[derive(Debug, Clone)]
pub struct StagedObject {
    pub bucket: String,
    pub key: String,
    data: Bytes,
}

/// `<user_id>/<unix_millis>.<ext>`; the extension falls back to `bin`.
pub fn object_key(owner: &UserId, file_name: &str, now: DateTime<Utc>) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    format!("{}/{}.{}", owner.namespace(), now.timestamp_millis(), ext)
}

pub struct UploadPipeline {
    backend: Arc<dyn Backend>,
    notices: Notices,
    timeout: Duration,
    max_size: usize,
    compensate_orphans: bool,
}

impl UploadPipeline {
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig, notices: Notices) -> Self {
        Self {
            backend,
            notices,
            timeout: config.remote_timeout,
            max_size: config.max_upload_size,
            compensate_orphans: config.compensate_orphans,
        }
    }

    /// Check the payload locally and assign its key. No remote call.
    pub fn stage(
        &self,
        bucket: &str,
        owner: &User,
        file_name: &str,
        data: Bytes,
    ) -> Result<StagedObject, SyncError> {
        let checked = if data.is_empty() {
            Err(ValidationError::EmptyFile)
        } else if data.len() > self.max_size {
            Err(ValidationError::FileTooLarge {
                size: data.len(),
                max: self.max_size,
            })
        } else {
            Ok(())
        };

        if let Err(e) = checked {
            self.notices.error("Please select a file", &e);
            return Err(e.into());
        }

        Ok(StagedObject {
            bucket: bucket.to_string(),
            key: object_key(&owner.id, file_name, Utc::now()),
            data,
        })
    }

    /// Upload the object, then create its record in `list` from the draft
    /// that `build` makes out of the public URL.
    pub async fn publish<R, D, F>(
        &self,
        list: &mut SyncList<R>,
        author: &User,
        staged: StagedObject,
        build: F,
    ) -> Result<R, SyncError>
    where
        R: Record,
        D: Draft<Record = R>,
        F: FnOnce(String) -> D,
    {
        let StagedObject { bucket, key, data } = staged;
        let size = data.len();

        if let Err(e) = bounded(self.timeout, self.backend.upload(&bucket, &key, data)).await {
            tracing::error!(%bucket, %key, error = %e, "Upload failed");
            self.notices.error("Upload failed", &e);
            return Err(e);
        }
        tracing::info!(%bucket, %key, size, "Object uploaded");

        let url = self.backend.public_url(&bucket, &key);
        match list.create(author, build(url)).await {
            Ok(record) => Ok(record),
            Err(source) => {
                tracing::warn!(
                    %bucket,
                    %key,
                    error = %source,
                    "Object stored but its record was not created"
                );
                let removed = self.compensate_orphans && self.remove_orphan(&bucket, &key).await;
                let err = SyncError::PartialUpload {
                    bucket,
                    key,
                    removed,
                    source: Box::new(source),
                };
                self.notices.error("Upload incomplete", &err);
                Err(err)
            }
        }
    }

    async fn remove_orphan(&self, bucket: &str, key: &str) -> bool {
        match bounded(self.timeout, self.backend.remove(bucket, key)).await {
            Ok(()) => {
                tracing::info!(%bucket, %key, "Removed orphaned object");
                true
            }
            Err(e) => {
                tracing::warn!(%bucket, %key, error = %e, "Failed to remove orphaned object");
                false
            }
        }
    }
}
