//! Store facade: the complete operation set the surrounding (HTTP) layer
//! calls, wired over the account directory, authorization registry, and
//! storage engine.

use std::path::Path;
use std::sync::Arc;

use crate::accounts::{AccountDirectory, Argon2Scheme, CredentialScheme};
use crate::auth::{Access, AccessLevel, AuthRegistry, Scope};
use crate::error::Result;
use crate::snapshot;
use crate::storage::{ExpectedVersion, PutOutcome, Resource, StorageEngine};

pub struct Store {
    accounts: AccountDirectory,
    auth: Arc<AuthRegistry>,
    storage: StorageEngine,
}

impl Store {
    /// A fresh in-memory store with Argon2 credential hashing.
    pub fn new() -> Self {
        Self::with_credentials(Box::new(Argon2Scheme))
    }

    /// A fresh store with an injected credential scheme.
    pub fn with_credentials(scheme: Box<dyn CredentialScheme>) -> Self {
        let auth = Arc::new(AuthRegistry::new());
        Self {
            accounts: AccountDirectory::new(scheme),
            storage: StorageEngine::new(auth.clone()),
            auth,
        }
    }

    /// A store rebuilt from a snapshot directory written by [`Store::save_to`].
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new();
        snapshot::load_into(dir.as_ref(), &store)?;
        Ok(store)
    }

    /// Persist the complete current state into `dir`.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        snapshot::save(dir.as_ref(), self)
    }

    // Account operations

    pub fn create_user(&self, username: &str, password: &str) -> Result<()> {
        self.accounts.create_user(username, password)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        self.accounts.authenticate(username, password)
    }

    // Authorization operations

    pub fn authorize(
        &self,
        host: &str,
        username: &str,
        permissions: &[(&str, Vec<AccessLevel>)],
    ) -> String {
        self.auth.authorize(host, username, permissions)
    }

    pub fn permissions(&self, username: &str, token: &str) -> Option<Scope> {
        self.auth.permissions(username, token)
    }

    pub fn revoke(&self, username: &str, token: &str) -> bool {
        self.auth.revoke(username, token)
    }

    // Storage operations

    pub fn put(
        &self,
        username: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
        expected: Option<ExpectedVersion>,
        access: &Access,
    ) -> Result<PutOutcome> {
        self.storage
            .put(username, path, content_type, content, expected, access)
    }

    pub fn get(&self, username: &str, path: &str, access: &Access) -> Result<Option<Resource>> {
        self.storage.get(username, path, access)
    }

    pub fn delete(&self, username: &str, path: &str, access: &Access) -> Result<bool> {
        self.storage.delete(username, path, access)
    }

    pub(crate) fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    pub(crate) fn auth(&self) -> &AuthRegistry {
        &self.auth
    }

    pub(crate) fn storage(&self) -> &StorageEngine {
        &self.storage
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
