//! Capabilities the client consumes from its backend collaborator.
//!
//! Each capability is a separate object-safe trait so that a backend can be
//! injected as `Arc<dyn Backend>` and swapped for a fake in tests.  All rows
//! travel as JSON objects keyed by column name.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::BackendError;
use crate::query::Query;
use crate::types::{RecordId, User};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Reads and writes against remote collections.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn read(&self, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Insert a row and return it as stored, including server-assigned
    /// columns.
    async fn insert(&self, collection: &str, row: Value) -> Result<Value, BackendError>;

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: Value,
    ) -> Result<(), BackendError>;

    /// Fails with [`BackendError::NotFound`] when no row has this id.
    async fn delete(&self, collection: &str, id: RecordId) -> Result<(), BackendError>;
}

/// Realtime change notifications.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(
        &self,
        collection: &str,
        kinds: &[ChangeKind],
    ) -> Result<ChangeStream, BackendError>;

    /// Release a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Binary object storage grouped in buckets.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), BackendError>;

    /// Stable public reference to an uploaded object.
    fn public_url(&self, bucket: &str, key: &str) -> String;

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), BackendError>;
}

/// The signed-in account, observable across login and logout.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;

    fn watch_user(&self) -> watch::Receiver<Option<User>>;
}

/// Everything a client needs from a backend.
pub trait Backend: CollectionStore + ChangeFeed + ObjectStorage + IdentityProvider {}

impl<T> Backend for T where T: CollectionStore + ChangeFeed + ObjectStorage + IdentityProvider {}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    /// The row after the change; for deletes, the removed row.
    pub record: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving end of one subscription.
///
/// Dropping the stream does not unsubscribe on the backend side; the owner
/// must call [`ChangeFeed::unsubscribe`] with [`ChangeStream::id`].
#[derive(Debug)]
pub struct ChangeStream {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeStream {
    pub fn new(id: SubscriptionId, rx: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. `None` once the backend has closed the
    /// subscription.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Next buffered event, without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ChangeStream {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Subscriber registry
// ---------------------------------------------------------------------------

struct Subscriber {
    collection: String,
    kinds: Vec<ChangeKind>,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Fan-out of change events to registered subscribers, for backend
/// implementations.
#[derive(Default)]
pub struct ChangeHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, collection: &str, kinds: &[ChangeKind]) -> ChangeStream {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Subscriber {
                collection: collection.to_string(),
                kinds: kinds.to_vec(),
                tx,
            },
        );
        ChangeStream::new(id, rx)
    }

    /// Returns whether the subscription was active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Deliver an event to every matching subscriber and return how many
    /// received it. Subscribers whose stream was dropped are pruned.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0;
        subscribers.retain(|_, sub| {
            if sub.collection != event.collection || !sub.kinds.contains(&event.kind) {
                return !sub.tx.is_closed();
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// Number of live subscriptions.
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
