//! [`LocalBackend`]: every backend capability the client consumes,
//! implemented in-process over SQLite and the filesystem.
//!
//! Besides storage it enforces what a hosted backend would: the collection
//! schemas in [`crate::schema`], row ownership policies, and per-user
//! storage namespaces.  Change events are published after each committed
//! write.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use agora_shared::constants::{
    BUCKET_POSTS, BUCKET_STUDY_MATERIALS, BUCKET_VIDEOS, MAX_UPLOAD_SIZE, PUBLIC_OBJECT_PATH,
};
use agora_shared::models::format_timestamp;
use agora_shared::{
    BackendError, ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, ChangeStream, CollectionStore,
    IdentityProvider, ObjectStorage, Query, RecordId, SubscriptionId, User, UserId,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::models::{StoredObject, StoredRecord};
use crate::objects::ObjectStore;
use crate::schema;

const BUCKETS: [&str; 3] = [BUCKET_POSTS, BUCKET_VIDEOS, BUCKET_STUDY_MATERIALS];

/// Settings for [`LocalBackend::open`].
#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
    /// Directory holding uploaded objects.
    pub storage_root: PathBuf,
    /// Base URL prepended to public object references.
    pub public_base_url: String,
    /// Maximum object size in bytes.
    pub max_object_size: usize,
}

impl LocalBackendConfig {
    pub fn new(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            public_base_url: "http://localhost:54321".to_string(),
            max_object_size: MAX_UPLOAD_SIZE,
        }
    }
}

pub struct LocalBackend {
    db: Mutex<Database>,
    feed: ChangeHub,
    objects: ObjectStore,
    public_base_url: String,
    session: watch::Sender<Option<User>>,
}

impl LocalBackend {
    pub async fn open(db: Database, config: LocalBackendConfig) -> Result<Self, BackendError> {
        let objects = ObjectStore::new(config.storage_root, config.max_object_size).await?;
        let (session, _) = watch::channel(None);

        info!(
            database = ?db.path(),
            public_base_url = %config.public_base_url,
            "Local backend ready"
        );

        Ok(Self {
            db: Mutex::new(db),
            feed: ChangeHub::new(),
            objects,
            public_base_url: config.public_base_url,
            session,
        })
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Create an account. Emails are unique.
    pub fn register(&self, email: &str) -> Result<User, BackendError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(BackendError::Constraint(format!("invalid email '{email}'")));
        }
        let user = User::new(email);
        self.db().insert_user(&user).map_err(|e| match BackendError::from(e) {
            BackendError::Constraint(_) => {
                BackendError::Constraint(format!("email '{}' is already registered", user.email))
            }
            other => other,
        })?;
        info!(user = %user.id.short(), "Registered account");
        Ok(user)
    }

    pub fn sign_in(&self, email: &str) -> Result<User, BackendError> {
        let user = self.db().get_user_by_email(&email.trim().to_lowercase())?;
        self.session.send_replace(Some(user.clone()));
        info!(user = %user.id.short(), "Signed in");
        Ok(user)
    }

    /// Sign in, registering the account first if it does not exist.
    pub fn sign_in_or_register(&self, email: &str) -> Result<User, BackendError> {
        match self.sign_in(email) {
            Err(BackendError::NotFound) => {
                self.register(email)?;
                self.sign_in(email)
            }
            other => other,
        }
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.session.send_replace(None) {
            info!(user = %user.id.short(), "Signed out");
        }
    }

    /// Number of open change subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.feed.active()
    }

    pub fn count(&self, collection: &str) -> Result<u64, BackendError> {
        Ok(self.db().count_records(collection)?)
    }

    pub fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        Ok(self.db().list_objects(bucket)?)
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn require_user(&self) -> Result<User, BackendError> {
        self.session.borrow().clone().ok_or(BackendError::Unauthorized)
    }

    fn publish(&self, kind: ChangeKind, collection: &str, record: Value) {
        let delivered = self.feed.publish(&ChangeEvent {
            kind,
            collection: collection.to_string(),
            record,
        });
        debug!(collection, ?kind, delivered, "Published change");
    }

    /// Storage keys live under the uploader's namespace.
    fn check_namespace(&self, user: &User, bucket: &str, key: &str) -> Result<(), BackendError> {
        if !BUCKETS.contains(&bucket) {
            return Err(BackendError::Storage(format!("unknown bucket '{bucket}'")));
        }
        let namespace = key.split('/').next().unwrap_or_default();
        if namespace != user.id.namespace() {
            return Err(BackendError::Forbidden(format!(
                "objects must be stored under '{}/'",
                user.id.namespace()
            )));
        }
        Ok(())
    }
}

fn author_of(record: &StoredRecord) -> UserId {
    record.user_id
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[async_trait]
impl CollectionStore for LocalBackend {
    async fn read(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let schema = schema::lookup(&query.collection)?;
        if !schema.has_column(&query.order_by) {
            return Err(BackendError::Constraint(format!(
                "cannot order {} by unknown column '{}'",
                schema.name, query.order_by
            )));
        }
        if let Some(filter) = &query.filter {
            if !schema.has_column(&filter.column) {
                return Err(BackendError::Constraint(format!(
                    "cannot filter {} by unknown column '{}'",
                    schema.name, filter.column
                )));
            }
        }

        let records = self.db().query_records(query)?;
        debug!(collection = %query.collection, rows = records.len(), "Read collection");
        Ok(records.iter().map(StoredRecord::to_value).collect())
    }

    async fn insert(&self, collection: &str, row: Value) -> Result<Value, BackendError> {
        let schema = schema::lookup(collection)?;
        let user = self.require_user()?;

        let id = RecordId::new();
        let created_at = Utc::now();
        let body = schema.prepare_insert(row, &id.to_string(), &format_timestamp(&created_at))?;

        let author = body
            .get("user_id")
            .and_then(Value::as_str)
            .and_then(|s| UserId::parse(s).ok())
            .ok_or_else(|| BackendError::Constraint("user_id must be a UUID".to_string()))?;
        if author != user.id {
            return Err(BackendError::Forbidden(
                "user_id must match the signed-in user".to_string(),
            ));
        }

        let mut record = StoredRecord {
            seq: 0,
            collection: collection.to_string(),
            id,
            user_id: author,
            created_at,
            body,
        };

        {
            let db = self.db();
            for (target, ref_id) in schema.references(&record.body) {
                let exists = RecordId::parse(&ref_id)
                    .ok()
                    .map(|rid| db.get_record(target, rid));
                match exists {
                    Some(Ok(_)) => {}
                    Some(Err(StoreError::NotFound)) | None => {
                        return Err(BackendError::Constraint(format!(
                            "{target} row '{ref_id}' does not exist"
                        )));
                    }
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            record.seq = db.insert_record(&record)?;
        }

        debug!(collection, id = %record.id, author = %user.id.short(), "Inserted record");
        let value = record.to_value();
        self.publish(ChangeKind::Insert, collection, value.clone());
        Ok(value)
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: Value,
    ) -> Result<(), BackendError> {
        let schema = schema::lookup(collection)?;
        let user = self.require_user()?;

        let merged = {
            let db = self.db();
            let stored = db.get_record(collection, id)?;

            let touches_guarded = schema
                .parent_guard
                .map(|(column, _)| patch.get(column).is_some())
                .unwrap_or(false);
            let allowed = match schema.parent_guard {
                Some((_, reference)) if touches_guarded => {
                    let parent = schema
                        .column(reference)
                        .and_then(|c| match c {
                            schema::Column::Reference(target) => Some(target),
                            _ => None,
                        })
                        .zip(stored.body.get(reference).and_then(Value::as_str))
                        .and_then(|(target, pid)| {
                            RecordId::parse(pid).ok().map(|pid| (target, pid))
                        });
                    match parent {
                        Some((target, pid)) => {
                            author_of(&db.get_record(target, pid)?) == user.id
                        }
                        None => false,
                    }
                }
                _ => author_of(&stored) == user.id,
            };
            if !allowed {
                warn!(collection, id = %id, user = %user.id.short(), "Update rejected by row policy");
                return Err(BackendError::Forbidden(format!(
                    "not allowed to update this {collection} row"
                )));
            }

            let merged = schema.apply_patch(&stored.body, patch)?;
            db.update_record_body(collection, id, &merged)?;
            merged
        };

        debug!(collection, id = %id, "Updated record");
        self.publish(ChangeKind::Update, collection, Value::Object(merged));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), BackendError> {
        let schema = schema::lookup(collection)?;
        let user = self.require_user()?;

        let removed = {
            let mut db = self.db();
            let stored = db.get_record(collection, id)?;
            if author_of(&stored) != user.id {
                warn!(collection, id = %id, user = %user.id.short(), "Delete rejected by row policy");
                return Err(BackendError::Forbidden(format!(
                    "only the author may delete this {collection} row"
                )));
            }
            db.delete_record_cascade(collection, id, schema.children)?
        };

        debug!(collection, id = %id, removed = removed.len(), "Deleted record");
        for record in removed {
            self.publish(ChangeKind::Delete, &record.collection, record.to_value());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

impl ChangeFeed for LocalBackend {
    fn subscribe(
        &self,
        collection: &str,
        kinds: &[ChangeKind],
    ) -> Result<ChangeStream, BackendError> {
        schema::lookup(collection)?;
        let stream = self.feed.subscribe(collection, kinds);
        debug!(collection, subscription = %stream.id(), "Opened subscription");
        Ok(stream)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.feed.unsubscribe(id) {
            debug!(subscription = %id, "Closed subscription");
        }
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[async_trait]
impl ObjectStorage for LocalBackend {
    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), BackendError> {
        let user = self.require_user()?;
        self.check_namespace(&user, bucket, key)?;

        let existing = self.db().get_object(bucket, key);
        match existing {
            Ok(_) => {
                return Err(BackendError::Constraint(format!(
                    "object '{bucket}/{key}' already exists"
                )))
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        self.objects.write(bucket, key, &data).await?;

        let object = StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as i64,
            blake3_hash: blake3::hash(&data).to_hex().to_string(),
            created_at: Utc::now(),
        };
        let recorded = self.db().insert_object(&object);
        if let Err(e) = recorded {
            if let Err(cleanup) = self.objects.remove(bucket, key).await {
                warn!(bucket, key, error = %cleanup, "Failed to remove unrecorded object");
            }
            return Err(e.into());
        }

        info!(bucket, key, size = object.size, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            PUBLIC_OBJECT_PATH,
            bucket,
            key
        )
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        let user = self.require_user()?;
        self.check_namespace(&user, bucket, key)?;

        self.objects.remove(bucket, key).await?;
        self.db().delete_object(bucket, key)?;

        info!(bucket, key, "Removed object");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

impl IdentityProvider for LocalBackend {
    fn current_user(&self) -> Option<User> {
        self.session.borrow().clone()
    }

    fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }
}
