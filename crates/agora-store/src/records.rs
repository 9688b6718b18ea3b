//! CRUD operations for [`StoredRecord`] rows.

use chrono::{DateTime, Utc};
use rusqlite::params;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use agora_shared::models::format_timestamp;
use agora_shared::{Query, RecordId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::StoredRecord;

const SELECT_COLUMNS: &str = "seq, collection, id, user_id, created_at, body";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a record and return its sequence number.
    pub fn insert_record(&self, record: &StoredRecord) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO records (collection, id, user_id, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.collection,
                record.id.to_string(),
                record.user_id.to_string(),
                format_timestamp(&record.created_at),
                serde_json::to_string(&record.body)?,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_record(&self, collection: &str, id: RecordId) -> Result<StoredRecord> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM records WHERE collection = ?1 AND id = ?2");
        let raw = self
            .conn()
            .query_row(&sql, params![collection, id.to_string()], row_to_raw)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        raw.decode()
    }

    /// Run a read query.  Column names in the filter and sort key are passed
    /// as JSON paths, never spliced into the SQL text.
    pub fn query_records(&self, query: &Query) -> Result<Vec<StoredRecord>> {
        let dir = query.direction.as_sql();
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM records WHERE collection = ?1");
        let mut args: Vec<SqlValue> = vec![SqlValue::Text(query.collection.clone())];

        if let Some(filter) = &query.filter {
            sql.push_str(" AND json_extract(body, ?2) IS ?3");
            args.push(SqlValue::Text(json_path(&filter.column)));
            args.push(to_sql_value(&filter.value));
        }

        args.push(SqlValue::Text(json_path(&query.order_by)));
        sql.push_str(&format!(
            " ORDER BY json_extract(body, ?{}) {dir}, seq {dir}",
            args.len()
        ));

        args.push(SqlValue::Integer(query.limit.map(i64::from).unwrap_or(-1)));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), row_to_raw)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }

    pub fn count_records(&self, collection: &str) -> Result<u64> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_record_body(
        &self,
        collection: &str,
        id: RecordId,
        body: &Map<String, Value>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE records SET body = ?1 WHERE collection = ?2 AND id = ?3",
            params![serde_json::to_string(body)?, collection, id.to_string()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a record together with the rows that reference it, in one
    /// transaction.  Returns every removed row, children first.
    pub fn delete_record_cascade(
        &mut self,
        collection: &str,
        id: RecordId,
        children: &[(&str, &str)],
    ) -> Result<Vec<StoredRecord>> {
        let tx = self.conn_mut().transaction()?;
        let mut removed = Vec::new();

        for (child_collection, column) in children {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM records
                 WHERE collection = ?1 AND json_extract(body, ?2) = ?3"
            );
            {
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(
                    params![child_collection, json_path(column), id.to_string()],
                    row_to_raw,
                )?;
                for row in rows {
                    removed.push(row?.decode()?);
                }
            }
            tx.execute(
                "DELETE FROM records WHERE collection = ?1 AND json_extract(body, ?2) = ?3",
                params![child_collection, json_path(column), id.to_string()],
            )?;
        }

        let parent = {
            let sql =
                format!("SELECT {SELECT_COLUMNS} FROM records WHERE collection = ?1 AND id = ?2");
            tx.query_row(&sql, params![collection, id.to_string()], row_to_raw)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                    other => StoreError::Sqlite(other),
                })?
                .decode()?
        };
        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id.to_string()],
        )?;
        removed.push(parent);

        tx.commit()?;
        Ok(removed)
    }
}

fn json_path(column: &str) -> String {
    format!("$.{column}")
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

// Columns as read from SQLite, before parsing.
struct RawRecord {
    seq: i64,
    collection: String,
    id: String,
    user_id: String,
    created_at: String,
    body: String,
}

impl RawRecord {
    fn decode(self) -> Result<StoredRecord> {
        let created_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&self.created_at)?.with_timezone(&Utc);
        let body: Map<String, Value> = serde_json::from_str(&self.body)?;
        Ok(StoredRecord {
            seq: self.seq,
            collection: self.collection,
            id: RecordId::parse(&self.id)?,
            user_id: UserId::parse(&self.user_id)?,
            created_at,
            body,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        seq: row.get(0)?,
        collection: row.get(1)?,
        id: row.get(2)?,
        user_id: row.get(3)?,
        created_at: row.get(4)?,
        body: row.get(5)?,
    })
}
