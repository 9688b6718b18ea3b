//! Typed rows of the remote collections, and the drafts a user fills in to
//! create them.
//!
//! Rows travel as JSON objects whose keys match the column names, so every
//! struct here derives `Serialize`/`Deserialize` without renaming.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::*;
use crate::error::ValidationError;
use crate::types::{RecordId, User, UserId};

/// A row of a remote collection that can be mirrored locally.
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the backing collection.
    const COLLECTION: &'static str;

    fn id(&self) -> RecordId;
    fn author(&self) -> UserId;
    fn created_at(&self) -> DateTime<Utc>;

    /// Client-side gate for destructive actions. Not a security boundary.
    fn is_owned_by(&self, user: &User) -> bool {
        self.author() == user.id
    }
}

/// User input for a new row, checked locally before any remote call.
pub trait Draft: Send {
    type Record: Record;

    fn validate(&self) -> Result<(), ValidationError>;

    /// The insert payload. Server-assigned columns (`id`, `created_at`) are
    /// left out.
    fn into_row(self, author: UserId) -> Value;
}

/// Fixed-width RFC 3339 so that lexical order is chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr) => {
        impl Record for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> RecordId {
                self.id
            }

            fn author(&self) -> UserId {
                self.user_id
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat room message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: RecordId,
    pub content: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl_record!(Message, COLLECTION_MESSAGES);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
}

impl Draft for NewMessage {
    type Record = Message;

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.content, "content")
    }

    fn into_row(self, author: UserId) -> Value {
        json!({
            "user_id": author,
            "content": self.content.trim(),
        })
    }
}

// ---------------------------------------------------------------------------
// Post (photo)
// ---------------------------------------------------------------------------

/// A photo in the community gallery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: RecordId,
    pub image_url: String,
    pub caption: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl_record!(Post, COLLECTION_POSTS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub image_url: String,
    pub caption: Option<String>,
}

impl Draft for NewPost {
    type Record = Post;

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.image_url, "image_url")
    }

    fn into_row(self, author: UserId) -> Value {
        json!({
            "user_id": author,
            "image_url": self.image_url,
            "caption": optional(self.caption),
        })
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Video {
    pub id: RecordId,
    pub video_url: String,
    pub title: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl_record!(Video, COLLECTION_VIDEOS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideo {
    pub video_url: String,
    pub title: String,
}

impl Draft for NewVideo {
    type Record = Video;

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "title")?;
        require(&self.video_url, "video_url")
    }

    fn into_row(self, author: UserId) -> Value {
        json!({
            "user_id": author,
            "video_url": self.video_url,
            "title": self.title.trim(),
        })
    }
}

// ---------------------------------------------------------------------------
// Doubt
// ---------------------------------------------------------------------------

/// A question posted to the student hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doubt {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub subject: Option<String>,
    /// Only ever moves from `false` to `true`.
    pub is_resolved: bool,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl_record!(Doubt, COLLECTION_DOUBTS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDoubt {
    pub title: String,
    pub description: String,
    pub subject: Option<String>,
}

impl Draft for NewDoubt {
    type Record = Doubt;

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "title")?;
        require(&self.description, "description")
    }

    fn into_row(self, author: UserId) -> Value {
        json!({
            "user_id": author,
            "title": self.title.trim(),
            "description": self.description.trim(),
            "subject": optional(self.subject),
        })
    }
}

// ---------------------------------------------------------------------------
// DoubtAnswer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoubtAnswer {
    pub id: RecordId,
    pub doubt_id: RecordId,
    pub content: String,
    pub is_accepted: bool,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl_record!(DoubtAnswer, COLLECTION_DOUBT_ANSWERS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub doubt_id: RecordId,
    pub content: String,
}

impl Draft for NewAnswer {
    type Record = DoubtAnswer;

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.content, "content")
    }

    fn into_row(self, author: UserId) -> Value {
        json!({
            "user_id": author,
            "doubt_id": self.doubt_id,
            "content": self.content.trim(),
        })
    }
}

// ---------------------------------------------------------------------------
// StudyMaterial
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Notes,
    QuestionPaper,
    Solution,
    Guide,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 4] = [
        MaterialKind::Notes,
        MaterialKind::QuestionPaper,
        MaterialKind::Solution,
        MaterialKind::Guide,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Notes => "notes",
            MaterialKind::QuestionPaper => "question_paper",
            MaterialKind::Solution => "solution",
            MaterialKind::Guide => "guide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl Default for MaterialKind {
    fn default() -> Self {
        MaterialKind::Notes
    }
}

/// Notes, papers and guides shared in the student hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyMaterial {
    pub id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub subject: String,
    pub file_url: Option<String>,
    pub material_type: MaterialKind,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl_record!(StudyMaterial, COLLECTION_STUDY_MATERIALS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaterial {
    pub title: String,
    pub description: Option<String>,
    pub subject: String,
    pub material_type: MaterialKind,
    pub file_url: Option<String>,
}

impl Draft for NewMaterial {
    type Record = StudyMaterial;

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "title")?;
        require(&self.subject, "subject")
    }

    fn into_row(self, author: UserId) -> Value {
        json!({
            "user_id": author,
            "title": self.title.trim(),
            "description": optional(self.description),
            "subject": self.subject,
            "material_type": self.material_type,
            "file_url": self.file_url,
        })
    }
}
