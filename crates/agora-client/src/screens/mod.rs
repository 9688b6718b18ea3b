//! Screen controllers.
//!
//! Each sub-module wires one or more [`SyncList`]s to a page of the
//! community site. Screens share the same lifecycle, captured by
//! [`Screen`], so the binary can drive them uniformly.

pub mod chat;
pub mod gallery;
pub mod hub;
pub mod videos;

use async_trait::async_trait;

use agora_shared::models::Record;
use agora_shared::{RecordId, User};

use crate::context::AppContext;
use crate::error::SyncError;
use crate::sync_list::SyncList;

pub use chat::ChatRoom;
pub use gallery::Gallery;
pub use hub::{Attachment, HubStats, StudentHub};
pub use videos::VideoWall;

#[async_trait]
pub trait Screen: Send {
    fn name(&self) -> &'static str;

    /// Load every list and start live updates.
    async fn open(&mut self) -> Result<(), SyncError>;

    /// Stop live updates. Loaded items stay readable.
    fn close(&mut self);

    /// Re-bind subscriptions after login or logout.
    async fn on_identity_change(&mut self, user: Option<&User>) -> Result<(), SyncError>;

    /// Apply buffered change events; returns how many records arrived.
    fn poll(&mut self) -> usize;
}

/// Initial load followed by subscribe, as every screen does on open.
pub(crate) async fn open_list<R: Record>(list: &mut SyncList<R>) -> Result<(), SyncError> {
    list.initialize().await?;
    list.subscribe()
}

/// Fresh subscription under the new session for lists that stay readable
/// while signed out. Closed lists stay closed.
pub(crate) fn resubscribe<R: Record>(list: &mut SyncList<R>) -> Result<(), SyncError> {
    if !list.is_subscribed() {
        return Ok(());
    }
    list.teardown();
    list.subscribe()
}

/// Client-side author gate for destructive actions. Records not loaded
/// locally pass through and the backend decides.
pub(crate) fn ensure_owner<R: Record>(
    ctx: &AppContext,
    list: &SyncList<R>,
    id: RecordId,
    user: &User,
    action: &str,
) -> Result<(), SyncError> {
    match list.get(id) {
        Some(record) if !record.is_owned_by(user) => {
            let err = SyncError::NotPermitted(format!("only the author can {action}"));
            ctx.notices.error("Not allowed", &err);
            Err(err)
        }
        _ => Ok(()),
    }
}
