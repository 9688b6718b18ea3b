//! Local mirror of one remote collection.
//!
//! A [`SyncList`] performs one bulk read, then keeps itself current by
//! appending insert events from a change subscription. Writes go to the
//! backend; only deletes are applied locally without waiting for the feed.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use agora_shared::models::{Draft, Record};
use agora_shared::{Backend, BackendError, ChangeEvent, ChangeKind, ChangeStream, Query};
use agora_shared::{RecordId, SubscriptionId, User};

use crate::error::SyncError;
use crate::events::Notices;

/// Bound a remote call by `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(SyncError::from),
        Err(_) => Err(SyncError::Timeout(limit)),
    }
}

pub(crate) fn decode<R: Record>(row: Value) -> Result<R, SyncError> {
    serde_json::from_value(row).map_err(|e| SyncError::Decode(e.to_string()))
}

/// Where a [`SyncList`] is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Ordered local copy of the records matching one [`Query`].
pub struct SyncList<R: Record> {
    backend: Arc<dyn Backend>,
    query: Query,
    items: Vec<R>,
    reverse_loaded: bool,
    state: LoadState,
    subscription: Option<ChangeStream>,
    notices: Notices,
    timeout: Duration,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> SyncList<R> {
    pub fn new(
        backend: Arc<dyn Backend>,
        query: Query,
        notices: Notices,
        timeout: Duration,
    ) -> Self {
        debug_assert_eq!(query.collection, R::COLLECTION);
        Self {
            backend,
            query,
            items: Vec::new(),
            reverse_loaded: false,
            state: LoadState::Idle,
            subscription: None,
            notices,
            timeout,
            _record: PhantomData,
        }
    }

    /// Keep bulk reads in the reverse of query order.
    ///
    /// Pairs with a descending, limited query to hold the most recent
    /// window oldest first.
    pub fn reverse_loaded(mut self) -> Self {
        self.reverse_loaded = true;
        self
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&R> {
        self.items.iter().find(|r| r.id() == id)
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(ChangeStream::id)
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Replace local state with one bulk read.
    ///
    /// On failure local state is emptied and the list is left `Failed`;
    /// there is no retry.
    pub async fn initialize(&mut self) -> Result<(), SyncError> {
        self.state = LoadState::Loading;

        let loaded = bounded(self.timeout, self.backend.read(&self.query))
            .await
            .and_then(|rows| rows.into_iter().map(decode::<R>).collect::<Result<Vec<_>, _>>());

        match loaded {
            Ok(mut items) => {
                if self.reverse_loaded {
                    items.reverse();
                }
                tracing::debug!(
                    collection = %self.query.collection,
                    count = items.len(),
                    "Initial sync complete"
                );
                self.items = items;
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    collection = %self.query.collection,
                    error = %e,
                    "Initial sync failed"
                );
                self.items.clear();
                self.state = LoadState::Failed;
                self.notices
                    .error(format!("Failed to load {}", self.query.collection), &e);
                Err(e)
            }
        }
    }

    /// Open the insert subscription. No-op while one is already active.
    pub fn subscribe(&mut self) -> Result<(), SyncError> {
        if let Some(stream) = &self.subscription {
            tracing::debug!(subscription = %stream.id(), "Already subscribed");
            return Ok(());
        }

        match self
            .backend
            .subscribe(&self.query.collection, &[ChangeKind::Insert])
        {
            Ok(stream) => {
                tracing::debug!(
                    collection = %self.query.collection,
                    subscription = %stream.id(),
                    "Subscribed to inserts"
                );
                self.subscription = Some(stream);
                Ok(())
            }
            Err(e) => {
                let e = SyncError::from(e);
                self.notices.error(
                    format!("Live updates for {} unavailable", self.query.collection),
                    &e,
                );
                Err(e)
            }
        }
    }

    /// Release the subscription, if any.
    pub fn teardown(&mut self) {
        if let Some(stream) = self.subscription.take() {
            tracing::debug!(subscription = %stream.id(), "Unsubscribing");
            self.backend.unsubscribe(stream.id());
        }
    }

    /// Follow an identity change: drop the old subscription and, if someone
    /// is signed in, reload and subscribe again.
    pub async fn rebind(&mut self, user: Option<&User>) -> Result<(), SyncError> {
        self.teardown();
        match user {
            Some(_) => {
                self.initialize().await?;
                self.subscribe()
            }
            None => Ok(()),
        }
    }

    /// Reload after a write that already succeeded.
    ///
    /// A failed reload leaves the list `Failed` with its own notice; it is
    /// not reported as a failure of the write.
    pub async fn refresh(&mut self) {
        if let Err(e) = self.initialize().await {
            tracing::warn!(
                collection = %self.query.collection,
                error = %e,
                "Refetch after write failed"
            );
        }
    }

    /// Apply every buffered change event without waiting. Returns how many
    /// records were appended.
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(stream) = self.subscription.as_mut() else {
                break;
            };
            let Some(event) = stream.try_recv() else {
                break;
            };
            if self.apply(event).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Wait until a streamed record is appended and return its id.
    ///
    /// `None` when there is no subscription or the backend closed it.
    pub async fn next_change(&mut self) -> Option<RecordId> {
        loop {
            let event = self.subscription.as_mut()?.recv().await;
            match event {
                Some(event) => {
                    if let Some(id) = self.apply(event) {
                        return Some(id);
                    }
                }
                None => {
                    tracing::warn!(collection = %self.query.collection, "Change stream closed");
                    self.teardown();
                    return None;
                }
            }
        }
    }

    fn apply(&mut self, event: ChangeEvent) -> Option<RecordId> {
        if event.kind != ChangeKind::Insert || !self.query.matches(&event.record) {
            return None;
        }

        let record = match decode::<R>(event.record) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    collection = %self.query.collection,
                    error = %e,
                    "Skipping undecodable change event"
                );
                return None;
            }
        };

        let id = record.id();
        if self.get(id).is_some() {
            tracing::trace!(%id, "Insert already present");
            return None;
        }

        // Arrival order, not sort order.
        self.items.push(record);
        Some(id)
    }

    /// Validate `draft` and insert it remotely.
    ///
    /// The new record is not added locally; it arrives through the
    /// subscription or the next [`SyncList::initialize`].
    pub async fn create<D>(&mut self, author: &User, draft: D) -> Result<R, SyncError>
    where
        D: Draft<Record = R>,
    {
        if let Err(e) = draft.validate() {
            self.notices.error("Please fill in all required fields", &e);
            return Err(e.into());
        }

        let row = draft.into_row(author.id);
        let created = bounded(
            self.timeout,
            self.backend.insert(&self.query.collection, row),
        )
        .await
        .and_then(decode::<R>);

        match created {
            Ok(record) => {
                tracing::info!(
                    collection = %self.query.collection,
                    id = %record.id(),
                    "Record created"
                );
                Ok(record)
            }
            Err(e) => {
                self.notices
                    .error(format!("Could not save to {}", self.query.collection), &e);
                Err(e)
            }
        }
    }

    /// Delete remotely, then drop the record locally.
    pub async fn delete(&mut self, id: RecordId) -> Result<(), SyncError> {
        let deleted = bounded(
            self.timeout,
            self.backend.delete(&self.query.collection, id),
        )
        .await;

        match deleted {
            Ok(()) => {
                self.items.retain(|r| r.id() != id);
                tracing::info!(collection = %self.query.collection, %id, "Record deleted");
                Ok(())
            }
            Err(e) => {
                self.notices.error("Delete failed", &e);
                Err(e)
            }
        }
    }

    /// Partial update followed by a full refetch. Only the update itself
    /// decides the result.
    pub async fn update(&mut self, id: RecordId, patch: Value) -> Result<(), SyncError> {
        let updated = bounded(
            self.timeout,
            self.backend.update(&self.query.collection, id, patch),
        )
        .await;

        if let Err(e) = updated {
            self.notices.error("Update failed", &e);
            return Err(e);
        }

        tracing::debug!(collection = %self.query.collection, %id, "Record updated");
        self.refresh().await;
        Ok(())
    }
}

impl<R: Record> Drop for SyncList<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoticeLevel;
    use crate::fake::{message_row, FakeBackend};
    use agora_shared::constants::COLLECTION_MESSAGES;
    use agora_shared::models::{Message, NewMessage};
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn chat(backend: &Arc<FakeBackend>) -> SyncList<Message> {
        SyncList::new(
            backend.clone(),
            Query::oldest_first(COLLECTION_MESSAGES),
            Notices::discard(),
            TIMEOUT,
        )
    }

    fn contents(list: &SyncList<Message>) -> Vec<String> {
        list.items().iter().map(|m| m.content.clone()).collect()
    }

    #[tokio::test]
    async fn initialize_mirrors_the_collection_in_query_order() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![
            message_row(&author, 2, "second"),
            message_row(&author, 1, "first"),
            message_row(&author, 3, "third"),
        ]);

        let mut list = chat(&backend);
        assert_eq!(list.state(), LoadState::Idle);
        list.initialize().await.unwrap();

        assert_eq!(list.state(), LoadState::Ready);
        assert_eq!(contents(&list), ["first", "second", "third"]);
        assert_eq!(backend.calls("read"), 1);
    }

    #[tokio::test]
    async fn initialize_on_empty_collection_is_ready_and_empty() {
        let backend = Arc::new(FakeBackend::new());
        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        assert_eq!(list.state(), LoadState::Ready);
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn initialize_failure_empties_state_and_notifies() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![message_row(&author, 1, "hi")]);

        let (notices, mut rx) = Notices::channel();
        let mut list = SyncList::<Message>::new(
            backend.clone(),
            Query::oldest_first(COLLECTION_MESSAGES),
            notices,
            TIMEOUT,
        );
        list.initialize().await.unwrap();
        assert_eq!(list.len(), 1);

        backend.fail("read");
        let err = list.initialize().await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));
        assert_eq!(list.state(), LoadState::Failed);
        assert!(list.is_empty());
        assert_eq!(backend.calls("read"), 2);

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.title, "Failed to load messages");
    }

    #[tokio::test]
    async fn streamed_inserts_append_in_arrival_order() {
        for n in [0usize, 1, 2, 17, 100] {
            let backend = Arc::new(FakeBackend::new());
            let author = backend.sign_in("a@example.org");
            let mut list = chat(&backend);
            list.initialize().await.unwrap();
            list.subscribe().unwrap();

            let rows: Vec<Value> = (0..n)
                .map(|i| message_row(&author, i as i64, &format!("m{i}")))
                .collect();
            for row in &rows {
                backend.emit_insert(COLLECTION_MESSAGES, row.clone());
            }

            assert_eq!(list.apply_pending(), n);
            assert_eq!(list.len(), n);
            let expected: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
            assert_eq!(contents(&list), expected);
        }
    }

    #[tokio::test]
    async fn streamed_insert_is_not_resorted() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![
            message_row(&author, 1, "1"),
            message_row(&author, 3, "3"),
        ]);

        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        list.subscribe().unwrap();

        backend.emit_insert(COLLECTION_MESSAGES, message_row(&author, 2, "2"));
        assert!(list.next_change().await.is_some());
        assert_eq!(contents(&list), ["1", "3", "2"]);
    }

    #[tokio::test]
    async fn duplicate_and_foreign_events_are_skipped() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        let row = message_row(&author, 1, "once");

        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        list.subscribe().unwrap();

        backend.emit_insert(COLLECTION_MESSAGES, row.clone());
        backend.emit_insert(COLLECTION_MESSAGES, row);
        backend.emit_insert(COLLECTION_MESSAGES, json!({"id": "not-a-uuid"}));
        assert_eq!(list.apply_pending(), 1);
        assert_eq!(contents(&list), ["once"]);
    }

    #[tokio::test]
    async fn subscribe_twice_delivers_each_insert_once() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        let mut list = chat(&backend);
        list.initialize().await.unwrap();

        list.subscribe().unwrap();
        let first = list.subscription_id();
        list.subscribe().unwrap();
        assert_eq!(list.subscription_id(), first);
        assert_eq!(backend.active_subscriptions(), 1);
        assert_eq!(backend.calls("subscribe"), 1);

        backend.emit_insert(COLLECTION_MESSAGES, message_row(&author, 1, "hello"));
        assert_eq!(list.apply_pending(), 1);
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn create_inserts_remotely_without_local_add() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        list.subscribe().unwrap();

        let created = list
            .create(&author, NewMessage { content: "  hey  ".into() })
            .await
            .unwrap();
        assert_eq!(created.content, "hey");
        assert_eq!(created.user_id, author.id);
        assert!(list.is_empty());
        assert_eq!(backend.calls("insert"), 1);

        // The echoed insert arrives through the feed.
        assert_eq!(list.apply_pending(), 1);
        assert_eq!(list.items()[0].id, created.id);
    }

    #[tokio::test]
    async fn validation_failure_makes_no_remote_call() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        let (notices, mut rx) = Notices::channel();
        let mut list = SyncList::<Message>::new(
            backend.clone(),
            Query::oldest_first(COLLECTION_MESSAGES),
            notices,
            TIMEOUT,
        );

        let err = list
            .create(&author, NewMessage { content: "   ".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn delete_removes_locally_only_on_success() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![
            message_row(&author, 1, "keep"),
            message_row(&author, 2, "drop"),
        ]);
        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        let target = list.items()[1].id;

        backend.fail("delete");
        assert!(list.delete(target).await.is_err());
        assert_eq!(list.len(), 2);

        backend.recover("delete");
        list.delete(target).await.unwrap();
        assert_eq!(contents(&list), ["keep"]);

        let err = list.delete(RecordId::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(BackendError::NotFound)));
        assert_eq!(contents(&list), ["keep"]);
    }

    #[tokio::test]
    async fn update_refetches_the_list() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![message_row(&author, 1, "draft")]);
        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        let id = list.items()[0].id;

        list.update(id, json!({"content": "final"})).await.unwrap();
        assert_eq!(contents(&list), ["final"]);
        assert_eq!(backend.calls("read"), 2);
    }

    #[tokio::test]
    async fn reverse_loaded_keeps_the_latest_window_oldest_first() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(
            COLLECTION_MESSAGES,
            (0..10).map(|i| message_row(&author, i, &format!("m{i}"))).collect(),
        );

        let mut list = SyncList::<Message>::new(
            backend.clone(),
            Query::newest_first(COLLECTION_MESSAGES).limit(3),
            Notices::discard(),
            TIMEOUT,
        )
        .reverse_loaded();
        list.initialize().await.unwrap();
        list.subscribe().unwrap();
        assert_eq!(contents(&list), ["m7", "m8", "m9"]);

        backend.emit_insert(COLLECTION_MESSAGES, message_row(&author, 10, "m10"));
        assert_eq!(list.apply_pending(), 1);
        assert_eq!(contents(&list), ["m7", "m8", "m9", "m10"]);
    }

    #[tokio::test]
    async fn update_succeeds_when_only_the_refetch_fails() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![message_row(&author, 1, "draft")]);
        let mut list = chat(&backend);
        list.initialize().await.unwrap();
        let id = list.items()[0].id;

        backend.fail("read");
        list.update(id, json!({"content": "final"})).await.unwrap();
        assert_eq!(backend.rows(COLLECTION_MESSAGES)[0]["content"], "final");
        assert_eq!(list.state(), LoadState::Failed);
    }

    #[tokio::test]
    async fn hung_delete_keeps_the_record() {
        let backend = Arc::new(FakeBackend::new());
        let author = backend.sign_in("a@example.org");
        backend.seed(COLLECTION_MESSAGES, vec![message_row(&author, 1, "stays")]);
        let mut list = SyncList::<Message>::new(
            backend.clone(),
            Query::oldest_first(COLLECTION_MESSAGES),
            Notices::discard(),
            Duration::from_millis(50),
        );
        list.initialize().await.unwrap();
        let id = list.items()[0].id;

        backend.hang("delete");
        let err = list.delete(id).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(contents(&list), ["stays"]);
        assert_eq!(backend.rows(COLLECTION_MESSAGES).len(), 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let backend = Arc::new(FakeBackend::new());
        backend.hang("read");
        let mut list = SyncList::<Message>::new(
            backend.clone(),
            Query::oldest_first(COLLECTION_MESSAGES),
            Notices::discard(),
            Duration::from_millis(50),
        );

        let err = list.initialize().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(list.state(), LoadState::Failed);
    }

    #[tokio::test]
    async fn rebind_and_drop_release_the_subscription() {
        let backend = Arc::new(FakeBackend::new());
        let user = backend.sign_in("a@example.org");
        let mut list = chat(&backend);
        list.subscribe().unwrap();
        assert_eq!(backend.active_subscriptions(), 1);

        list.rebind(None).await.unwrap();
        assert!(!list.is_subscribed());
        assert_eq!(backend.active_subscriptions(), 0);

        list.rebind(Some(&user)).await.unwrap();
        assert_eq!(backend.active_subscriptions(), 1);
        assert_eq!(list.state(), LoadState::Ready);

        drop(list);
        assert_eq!(backend.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn next_change_without_subscription_returns_none() {
        let backend = Arc::new(FakeBackend::new());
        let mut list = chat(&backend);
        assert_eq!(list.next_change().await, None);
    }
}
