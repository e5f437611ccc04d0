//! Error taxonomy for the store.
//!
//! Account validation, authentication, permission, and version-conflict
//! failures are all recoverable and surface the exact message the caller
//! should see. Absence is not an error: `get` on a missing resource returns
//! `None` and `delete` reports `deleted = false`.

use thiserror::Error;

/// Account creation failures. No mutation occurs when one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username must be at least 2 characters long")]
    UsernameTooShort,
    #[error("Password must not be blank")]
    PasswordBlank,
    #[error("The username is already taken")]
    UsernameTaken,
}

/// Authentication failures. The two cases are distinguished on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Username not found")]
    UnknownUsername,
    #[error("Incorrect password")]
    IncorrectPassword,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The token's scope does not grant the required action on the path.
    /// The message never reveals whether the resource exists.
    #[error("access denied for {path}")]
    PermissionDenied { path: String },

    /// An `ExpectedVersion` precondition did not hold. No mutation occurred.
    #[error("version conflict at {path}")]
    VersionConflict { path: String },

    /// The path is malformed, or is directory-shaped where a document path
    /// is required.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Failure in the backing storage, kept opaque and distinct from the
    /// validation taxonomy above.
    #[error("storage backend error")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub(crate) fn backend(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend(err.into())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
