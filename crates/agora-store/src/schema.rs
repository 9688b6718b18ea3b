//! Server-side shape and constraints of every known collection.
//!
//! The local backend checks rows against these definitions the way a hosted
//! database would enforce its table schema: required columns, defaults,
//! immutable columns, enum values and references.

use serde_json::{Map, Value};

use agora_shared::constants::*;
use agora_shared::models::MaterialKind;
use agora_shared::BackendError;

/// Column kinds understood by the local backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Non-empty string.
    Text,
    /// String or null; defaults to null.
    OptionalText,
    /// Boolean; defaults to `false`.
    Flag,
    /// Boolean that may only move from `false` to `true`.
    MonotonicFlag,
    /// Id of a row in another collection; immutable.
    Reference(&'static str),
    /// One of the [`MaterialKind`] names; defaults to `notes`.
    MaterialKind,
}

#[derive(Debug)]
pub struct CollectionSchema {
    pub name: &'static str,
    pub columns: &'static [(&'static str, Column)],
    /// Rows in other collections deleted together with a row of this one:
    /// `(collection, referencing column)`.
    pub children: &'static [(&'static str, &'static str)],
    /// A column whose changes are authorized against the author of a
    /// referenced row instead of the row's own author:
    /// `(guarded column, reference column)`.
    pub parent_guard: Option<(&'static str, &'static str)>,
}

/// Columns every collection carries, assigned or checked by the backend.
pub const SYSTEM_COLUMNS: [&str; 3] = ["id", "user_id", "created_at"];

static SCHEMAS: [CollectionSchema; 6] = [
    CollectionSchema {
        name: COLLECTION_MESSAGES,
        columns: &[("content", Column::Text)],
        children: &[],
        parent_guard: None,
    },
    CollectionSchema {
        name: COLLECTION_POSTS,
        columns: &[
            ("image_url", Column::Text),
            ("caption", Column::OptionalText),
        ],
        children: &[],
        parent_guard: None,
    },
    CollectionSchema {
        name: COLLECTION_VIDEOS,
        columns: &[("video_url", Column::Text), ("title", Column::Text)],
        children: &[],
        parent_guard: None,
    },
    CollectionSchema {
        name: COLLECTION_DOUBTS,
        columns: &[
            ("title", Column::Text),
            ("description", Column::Text),
            ("subject", Column::OptionalText),
            ("is_resolved", Column::MonotonicFlag),
        ],
        children: &[(COLLECTION_DOUBT_ANSWERS, "doubt_id")],
        parent_guard: None,
    },
    CollectionSchema {
        name: COLLECTION_DOUBT_ANSWERS,
        columns: &[
            ("doubt_id", Column::Reference(COLLECTION_DOUBTS)),
            ("content", Column::Text),
            ("is_accepted", Column::Flag),
        ],
        children: &[],
        parent_guard: Some(("is_accepted", "doubt_id")),
    },
    CollectionSchema {
        name: COLLECTION_STUDY_MATERIALS,
        columns: &[
            ("title", Column::Text),
            ("description", Column::OptionalText),
            ("subject", Column::Text),
            ("file_url", Column::OptionalText),
            ("material_type", Column::MaterialKind),
        ],
        children: &[],
        parent_guard: None,
    },
];

pub fn lookup(collection: &str) -> Result<&'static CollectionSchema, BackendError> {
    SCHEMAS
        .iter()
        .find(|s| s.name == collection)
        .ok_or_else(|| BackendError::UnknownCollection(collection.to_string()))
}

fn violation(msg: String) -> BackendError {
    BackendError::Constraint(msg)
}

impl CollectionSchema {
    pub fn column(&self, name: &str) -> Option<Column> {
        self.columns
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
    }

    /// Whether `name` can be used in a filter or sort key.
    pub fn has_column(&self, name: &str) -> bool {
        SYSTEM_COLUMNS.contains(&name) || self.column(name).is_some()
    }

    /// Check an insert payload and fill in defaults.  `id` and `created_at`
    /// are server-assigned and overwrite anything the client sent.
    pub fn prepare_insert(
        &self,
        row: Value,
        id: &str,
        created_at: &str,
    ) -> Result<Map<String, Value>, BackendError> {
        let mut row = match row {
            Value::Object(map) => map,
            _ => return Err(violation(format!("{}: row must be an object", self.name))),
        };

        for key in row.keys() {
            if !self.has_column(key) {
                return Err(violation(format!("{}: unknown column '{key}'", self.name)));
            }
        }

        match row.get("user_id") {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            _ => return Err(violation(format!("{}: user_id is required", self.name))),
        }

        for (name, column) in self.columns {
            let value = row.remove(*name).unwrap_or(Value::Null);
            let value = self.check_value(name, *column, value)?;
            row.insert(name.to_string(), value);
        }

        row.insert("id".into(), Value::String(id.to_string()));
        row.insert("created_at".into(), Value::String(created_at.to_string()));
        Ok(row)
    }

    /// Merge a partial update into the current row, enforcing immutability
    /// and monotonic flags.
    pub fn apply_patch(
        &self,
        current: &Map<String, Value>,
        patch: Value,
    ) -> Result<Map<String, Value>, BackendError> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(violation(format!("{}: patch must be an object", self.name))),
        };
        if patch.is_empty() {
            return Err(violation(format!("{}: empty patch", self.name)));
        }

        let mut merged = current.clone();
        for (name, value) in patch {
            if SYSTEM_COLUMNS.contains(&name.as_str()) {
                return Err(violation(format!("{}: '{name}' is immutable", self.name)));
            }
            let column = self
                .column(&name)
                .ok_or_else(|| violation(format!("{}: unknown column '{name}'", self.name)))?;
            if let Column::Reference(_) = column {
                return Err(violation(format!("{}: '{name}' is immutable", self.name)));
            }
            let value = self.check_value(&name, column, value)?;
            if column == Column::MonotonicFlag
                && current.get(&name) == Some(&Value::Bool(true))
                && value == Value::Bool(false)
            {
                return Err(violation(format!(
                    "{}: '{name}' cannot be cleared once set",
                    self.name
                )));
            }
            merged.insert(name, value);
        }
        Ok(merged)
    }

    /// `(collection, id)` pairs the row points at, which must exist.
    pub fn references(&self, row: &Map<String, Value>) -> Vec<(&'static str, String)> {
        self.columns
            .iter()
            .filter_map(|(name, column)| match column {
                Column::Reference(target) => row
                    .get(*name)
                    .and_then(Value::as_str)
                    .map(|id| (*target, id.to_string())),
                _ => None,
            })
            .collect()
    }

    fn check_value(&self, name: &str, column: Column, value: Value) -> Result<Value, BackendError> {
        let bad_type = |expected: &str| {
            violation(format!("{}: '{name}' must be {expected}", self.name))
        };
        match (column, value) {
            (Column::Text | Column::Reference(_), Value::String(s)) if !s.trim().is_empty() => {
                Ok(Value::String(s))
            }
            (Column::Text | Column::Reference(_), _) => {
                Err(violation(format!("{}: {name} is required", self.name)))
            }
            (Column::OptionalText, v @ (Value::String(_) | Value::Null)) => Ok(v),
            (Column::OptionalText, _) => Err(bad_type("a string or null")),
            (Column::Flag | Column::MonotonicFlag, Value::Null) => Ok(Value::Bool(false)),
            (Column::Flag | Column::MonotonicFlag, v @ Value::Bool(_)) => Ok(v),
            (Column::Flag | Column::MonotonicFlag, _) => Err(bad_type("a boolean")),
            (Column::MaterialKind, Value::Null) => {
                Ok(Value::String(MaterialKind::default().as_str().to_string()))
            }
            (Column::MaterialKind, Value::String(s)) if MaterialKind::parse(&s).is_some() => {
                Ok(Value::String(s))
            }
            (Column::MaterialKind, _) => Err(bad_type("one of notes, question_paper, solution, guide")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_collection_is_reported() {
        assert_eq!(
            lookup("likes").unwrap_err(),
            BackendError::UnknownCollection("likes".into())
        );
    }

    #[test]
    fn insert_fills_defaults_and_server_columns() {
        let schema = lookup(COLLECTION_DOUBTS).unwrap();
        let row = schema
            .prepare_insert(
                json!({"user_id": "u", "title": "t", "description": "d", "id": "spoofed"}),
                "real-id",
                "2026-01-01T00:00:00.000000Z",
            )
            .unwrap();
        assert_eq!(row["id"], "real-id");
        assert_eq!(row["is_resolved"], false);
        assert_eq!(row["subject"], Value::Null);
        assert_eq!(row["created_at"], "2026-01-01T00:00:00.000000Z");
    }

    #[test]
    fn insert_rejects_bad_rows() {
        let schema = lookup(COLLECTION_STUDY_MATERIALS).unwrap();
        let err = schema
            .prepare_insert(json!({"user_id": "u", "title": "t"}), "i", "c")
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint(m) if m.contains("subject")));

        let err = schema
            .prepare_insert(
                json!({"user_id": "u", "title": "t", "subject": "Physics", "material_type": "slides"}),
                "i",
                "c",
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint(_)));

        let err = schema
            .prepare_insert(json!({"title": "t", "subject": "Physics"}), "i", "c")
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint(m) if m.contains("user_id")));

        let err = schema
            .prepare_insert(
                json!({"user_id": "u", "title": "t", "subject": "Physics", "likes": 3}),
                "i",
                "c",
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint(m) if m.contains("likes")));
    }

    #[test]
    fn resolved_flag_is_monotonic() {
        let schema = lookup(COLLECTION_DOUBTS).unwrap();
        let current = schema
            .prepare_insert(
                json!({"user_id": "u", "title": "t", "description": "d"}),
                "i",
                "c",
            )
            .unwrap();

        let resolved = schema
            .apply_patch(&current, json!({"is_resolved": true}))
            .unwrap();
        assert_eq!(resolved["is_resolved"], true);

        let err = schema
            .apply_patch(&resolved, json!({"is_resolved": false}))
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint(_)));
    }

    #[test]
    fn system_and_reference_columns_are_immutable() {
        let schema = lookup(COLLECTION_DOUBT_ANSWERS).unwrap();
        let current = schema
            .prepare_insert(
                json!({"user_id": "u", "doubt_id": "d1", "content": "c"}),
                "i",
                "c",
            )
            .unwrap();
        assert_eq!(schema.references(&current), vec![(COLLECTION_DOUBTS, "d1".to_string())]);

        for patch in [
            json!({"user_id": "someone-else"}),
            json!({"doubt_id": "d2"}),
            json!({"created_at": "x"}),
            json!({}),
        ] {
            assert!(schema.apply_patch(&current, patch).is_err());
        }
        assert!(schema
            .apply_patch(&current, json!({"is_accepted": true}))
            .is_ok());
    }
}
