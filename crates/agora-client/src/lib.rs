//! # agora-client
//!
//! Live views over the community backend: each screen mirrors one or more
//! remote collections through a [`SyncList`], which loads once and then
//! follows the change feed.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod screens;
pub mod session;
pub mod sync_list;
pub mod upload;

#[cfg(test)]
mod fake;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use context::AppContext;
pub use error::SyncError;
pub use events::{Notice, NoticeLevel, Notices};
pub use screens::{ChatRoom, Gallery, Screen, StudentHub, VideoWall};
pub use session::Session;
pub use sync_list::{LoadState, SyncList};
pub use upload::{StagedObject, UploadPipeline};

/// Install the global tracing subscriber. Respects `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,agora_client=debug,agora_store=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
