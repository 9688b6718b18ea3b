//! # agora-shared
//!
//! Types shared by the Agora client and its backends: identifiers, entity
//! rows and drafts, read queries, the backend capability traits and the
//! error taxonomy they report.

pub mod backend;
pub mod constants;
pub mod error;
pub mod models;
pub mod query;
pub mod types;

pub use backend::{
    Backend, ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, ChangeStream, CollectionStore,
    IdentityProvider, ObjectStorage, SubscriptionId,
};
pub use error::{BackendError, ValidationError};
pub use query::{Direction, Filter, Query};
pub use types::{RecordId, User, UserId};
