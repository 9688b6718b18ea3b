//! Row structs persisted in the local SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use agora_shared::{RecordId, UserId};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One entry of a collection.  `body` holds every column, including the
/// lifted-out `id`, `user_id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Insertion sequence; tie-breaker for rows created in the same
    /// microsecond.  Zero until inserted.
    pub seq: i64,
    pub collection: String,
    pub id: RecordId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub body: Map<String, Value>,
}

impl StoredRecord {
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

// ---------------------------------------------------------------------------
// Object (storage metadata)
// ---------------------------------------------------------------------------

/// Metadata for a binary held in object storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    /// Path inside the bucket, `<namespace>/<file>`.
    pub key: String,
    /// File size in bytes.
    pub size: i64,
    /// BLAKE3 content hash (hex string).
    pub blake3_hash: String,
    pub created_at: DateTime<Utc>,
}
