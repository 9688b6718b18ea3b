//! Read queries against a remote collection.
//!
//! A [`Query`] always carries an explicit sort key and direction: the backend
//! defines no implicit row order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    pub order_by: String,
    pub direction: Direction,
    pub limit: Option<u32>,
}

impl Query {
    /// All rows of `collection`, newest first.
    pub fn newest_first(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filter: None,
            order_by: "created_at".to_string(),
            direction: Direction::Descending,
            limit: None,
        }
    }

    /// All rows of `collection`, oldest first.
    pub fn oldest_first(collection: &str) -> Self {
        Self {
            direction: Direction::Ascending,
            ..Self::newest_first(collection)
        }
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row (as delivered by a change event) satisfies the filter.
    pub fn matches(&self, row: &Value) -> bool {
        match &self.filter {
            None => true,
            Some(f) => row.get(&f.column).unwrap_or(&Value::Null) == &f.value,
        }
    }
}
