//! Object storage: binaries on the filesystem, metadata in SQLite.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio::fs;
use tracing::{debug, info};

use agora_shared::models::format_timestamp;
use agora_shared::BackendError;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::StoredObject;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

impl Database {
    pub fn insert_object(&self, object: &StoredObject) -> Result<()> {
        self.conn().execute(
            "INSERT INTO objects (bucket, key, size, blake3_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                object.bucket,
                object.key,
                object.size,
                object.blake3_hash,
                format_timestamp(&object.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        self.conn()
            .query_row(
                "SELECT bucket, key, size, blake3_hash, created_at
                 FROM objects WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                row_to_object,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>> {
        let mut stmt = self.conn().prepare(
            "SELECT bucket, key, size, blake3_hash, created_at
             FROM objects WHERE bucket = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![bucket], row_to_object)?;

        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }

    // only removes the db record, not the file on disk
    pub fn delete_object(&self, bucket: &str, key: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM objects WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredObject> {
    let created_str: String = row.get(4)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(StoredObject {
        bucket: row.get(0)?,
        key: row.get(1)?,
        size: row.get(2)?,
        blake3_hash: row.get(3)?,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Resolve `<bucket>/<key>` under `base`, rejecting anything that would
/// escape it.
fn resolve_within(base: &Path, bucket: &str, key: &str) -> std::result::Result<PathBuf, BackendError> {
    let mut resolved = base.to_path_buf();
    let relative = Path::new(bucket).join(key);
    let mut depth = 0;
    for component in relative.components() {
        match component {
            Component::Normal(c) => {
                resolved.push(c);
                depth += 1;
            }
            _ => {
                return Err(BackendError::Storage(format!(
                    "invalid object path '{bucket}/{key}'"
                )));
            }
        }
    }
    // bucket plus at least one key segment
    if depth < 2 {
        return Err(BackendError::Storage(format!(
            "invalid object path '{bucket}/{key}'"
        )));
    }
    Ok(resolved)
}

/// Filesystem holder for uploaded binaries.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    base_path: PathBuf,
    max_size: usize,
}

impl ObjectStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> std::result::Result<Self, BackendError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            BackendError::Storage(format!(
                "Failed to create storage directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Object store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn path_for(&self, bucket: &str, key: &str) -> std::result::Result<PathBuf, BackendError> {
        resolve_within(&self.base_path, bucket, key)
    }

    pub async fn write(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> std::result::Result<(), BackendError> {
        if data.is_empty() {
            return Err(BackendError::Storage("Empty object".to_string()));
        }
        if data.len() > self.max_size {
            return Err(BackendError::PayloadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let path = self.path_for(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                BackendError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        fs::write(&path, data).await.map_err(|e| {
            BackendError::Storage(format!("Failed to write object {bucket}/{key}: {e}"))
        })?;

        debug!(bucket, key, size = data.len(), "Stored object");
        Ok(())
    }

    pub async fn remove(&self, bucket: &str, key: &str) -> std::result::Result<(), BackendError> {
        let path = self.path_for(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(bucket, key, "Removed object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackendError::NotFound),
            Err(e) => Err(BackendError::Storage(format!(
                "Failed to remove object {bucket}/{key}: {e}"
            ))),
        }
    }
}
