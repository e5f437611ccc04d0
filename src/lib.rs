//! Per-user hierarchical document store with scoped access tokens.
//!
//! Documents live under slash-delimited paths in a flat keyed store; the
//! directory tree is derived state. Intermediate directories materialize on
//! `put` and are pruned when their last document disappears, and every
//! directory reports the most recent modification beneath it. Access is
//! gated by opaque tokens whose scopes grant read/write per path prefix,
//! resolved by longest-prefix match.

pub mod accounts;
pub mod auth;
pub mod error;
pub mod paths;
pub mod snapshot;
pub mod storage;
pub mod store;

pub use accounts::{AccountDirectory, Argon2Scheme, CredentialScheme, User};
pub use auth::{Access, AccessLevel, AuthRegistry, Grant, Scope};
pub use error::{AuthError, Result, StoreError, ValidationError};
pub use storage::{
    DirEntry, DocumentRecord, ExpectedVersion, PutOutcome, Resource, StorageEngine,
};
pub use store::Store;
