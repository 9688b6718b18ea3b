//! # agora-store
//!
//! Local backend for the Agora client, backed by SQLite and the filesystem.
//!
//! [`LocalBackend`] implements every capability trait from
//! [`agora_shared::backend`]: collections with schema constraints and row
//! policies, a realtime change feed, object storage with per-user
//! namespaces, and a sign-in session.  The synchronous [`Database`] handle
//! underneath wraps a `rusqlite::Connection` and provides typed CRUD helpers.

pub mod backend;
pub mod database;
pub mod migrations;
pub mod models;
pub mod objects;
pub mod records;
pub mod schema;
pub mod users;

mod error;

pub use backend::{LocalBackend, LocalBackendConfig};
pub use database::{default_data_dir, Database};
pub use error::StoreError;
pub use models::*;
pub use objects::ObjectStore;
