//! Shared handles every screen is built from.
//!
//! [`AppContext`] is cheap to clone; each screen keeps its own copy and
//! owns its lists exclusively.

use std::sync::Arc;

use agora_shared::models::Record;
use agora_shared::{Backend, Query, User};

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::events::Notices;
use crate::session::Session;
use crate::sync_list::SyncList;
use crate::upload::UploadPipeline;

#[derive(Clone)]
pub struct AppContext {
    pub backend: Arc<dyn Backend>,
    pub session: Session,
    pub notices: Notices,
    pub config: Arc<ClientConfig>,
}

impl AppContext {
    pub fn new(backend: Arc<dyn Backend>, notices: Notices, config: ClientConfig) -> Self {
        let session = Session::new(backend.watch_user());
        Self {
            backend,
            session,
            notices,
            config: Arc::new(config),
        }
    }

    /// A fresh, unloaded list bound to this context's backend.
    pub fn list<R: Record>(&self, query: Query) -> SyncList<R> {
        SyncList::new(
            self.backend.clone(),
            query,
            self.notices.clone(),
            self.config.remote_timeout,
        )
    }

    pub fn uploads(&self) -> UploadPipeline {
        UploadPipeline::new(self.backend.clone(), &self.config, self.notices.clone())
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    /// The signed-in user, or a "please login" notice.
    pub fn require_user(&self, action: &str) -> Result<User, SyncError> {
        self.session.require_user().map_err(|e| {
            self.notices.error(format!("Please login to {action}"), &e);
            e
        })
    }
}
