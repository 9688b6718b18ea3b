//! In-memory backend for controller tests, with call counters and failure
//! injection.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use agora_shared::models::format_timestamp;
use agora_shared::query::Direction;
use agora_shared::{
    BackendError, ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, ChangeStream, CollectionStore,
    IdentityProvider, ObjectStorage, Query, RecordId, SubscriptionId, User,
};

pub struct FakeBackend {
    rows: Mutex<HashMap<String, Vec<Value>>>,
    objects: Mutex<HashMap<String, Bytes>>,
    hub: ChangeHub,
    session: watch::Sender<Option<User>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: Mutex<HashSet<&'static str>>,
    hanging: Mutex<HashSet<&'static str>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            rows: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            hub: ChangeHub::new(),
            session,
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
        }
    }

    pub fn sign_in(&self, email: &str) -> User {
        let user = User::new(email);
        self.session.send_replace(Some(user.clone()));
        user
    }

    pub fn sign_out(&self) {
        self.session.send_replace(None);
    }

    pub fn seed(&self, collection: &str, rows: Vec<Value>) {
        self.rows
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Publish an insert as if another client had written it.
    pub fn emit_insert(&self, collection: &str, record: Value) {
        self.hub.publish(&ChangeEvent {
            kind: ChangeKind::Insert,
            collection: collection.to_string(),
            record,
        });
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    pub fn hang(&self, op: &'static str) {
        self.hanging.lock().unwrap().insert(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.hub.active()
    }

    pub fn has_object(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&format!("{bucket}/{key}"))
    }

    async fn enter(&self, op: &'static str) -> Result<(), BackendError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        let hangs = self.hanging.lock().unwrap().contains(op);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(op) {
            return Err(BackendError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for FakeBackend {
    async fn read(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.enter("read").await?;
        let mut rows: Vec<Value> = self
            .rows(&query.collection)
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        let key = |row: &Value| row[query.order_by.as_str()].to_string();
        rows.sort_by_key(key);
        if query.direction == Direction::Descending {
            rows.reverse();
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, BackendError> {
        self.enter("insert").await?;
        let mut row = match row {
            Value::Object(map) => map,
            _ => return Err(BackendError::Constraint("row must be an object".into())),
        };
        row.entry("id").or_insert_with(|| json!(RecordId::new()));
        row.entry("created_at")
            .or_insert_with(|| json!(format_timestamp(&Utc::now())));
        row.entry("is_resolved").or_insert(json!(false));
        row.entry("is_accepted").or_insert(json!(false));
        let row = Value::Object(row);

        self.seed(collection, vec![row.clone()]);
        self.hub.publish(&ChangeEvent {
            kind: ChangeKind::Insert,
            collection: collection.to_string(),
            record: row.clone(),
        });
        Ok(row)
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: Value,
    ) -> Result<(), BackendError> {
        self.enter("update").await?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|r| r["id"] == json!(id)))
            .ok_or(BackendError::NotFound)?;
        if let (Value::Object(row), Value::Object(patch)) = (row, patch) {
            row.extend(patch);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), BackendError> {
        self.enter("delete").await?;
        let mut rows = self.rows.lock().unwrap();
        let rows = rows.get_mut(collection).ok_or(BackendError::NotFound)?;
        let before = rows.len();
        rows.retain(|r| r["id"] != json!(id));
        if rows.len() == before {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }
}

impl ChangeFeed for FakeBackend {
    fn subscribe(
        &self,
        collection: &str,
        kinds: &[ChangeKind],
    ) -> Result<ChangeStream, BackendError> {
        *self.calls.lock().unwrap().entry("subscribe").or_insert(0) += 1;
        Ok(self.hub.subscribe(collection, kinds))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.hub.unsubscribe(id);
    }
}

#[async_trait]
impl ObjectStorage for FakeBackend {
    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), BackendError> {
        self.enter("upload").await?;
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), data);
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("http://fake.local/{bucket}/{key}")
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        self.enter("remove").await?;
        self.objects
            .lock()
            .unwrap()
            .remove(&format!("{bucket}/{key}"))
            .map(|_| ())
            .ok_or(BackendError::NotFound)
    }
}

impl IdentityProvider for FakeBackend {
    fn current_user(&self) -> Option<User> {
        self.session.borrow().clone()
    }

    fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }
}

/// A chat message row created `secs` seconds after a fixed epoch.
pub fn message_row(author: &User, secs: i64, content: &str) -> Value {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut row = Map::new();
    row.insert("id".into(), json!(RecordId::new()));
    row.insert("user_id".into(), json!(author.id));
    row.insert("content".into(), json!(content));
    row.insert(
        "created_at".into(),
        json!(format_timestamp(&(base + chrono::Duration::seconds(secs)))),
    );
    Value::Object(row)
}
