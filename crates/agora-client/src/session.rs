//! The signed-in user, as an observable value.
//!
//! Operations that need an identity take the [`User`] explicitly; screens
//! read it from a [`Session`] and re-bind their subscriptions when it
//! changes.

use tokio::sync::watch;

use agora_shared::User;

use crate::error::SyncError;

#[derive(Debug, Clone)]
pub struct Session {
    rx: watch::Receiver<Option<User>>,
}

impl Session {
    pub fn new(rx: watch::Receiver<Option<User>>) -> Self {
        Self { rx }
    }

    pub fn current_user(&self) -> Option<User> {
        self.rx.borrow().clone()
    }

    pub fn require_user(&self) -> Result<User, SyncError> {
        self.current_user().ok_or(SyncError::Unauthenticated)
    }

    /// Wait for the next login or logout and return the new user.
    /// `None` once the identity provider is gone.
    pub async fn changed(&mut self) -> Option<Option<User>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
