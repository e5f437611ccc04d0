//! Account directory: user records and password authentication.
//!
//! Credentials are derived strings, never plaintext. The hashing algorithm
//! sits behind [`CredentialScheme`] so the rest of the store only relies on
//! derive/verify; [`Argon2Scheme`] is the default.

use std::collections::HashMap;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result, StoreError, ValidationError};

const MIN_USERNAME_LEN: usize = 2;

/// Derives stored credentials from passwords and verifies them later.
pub trait CredentialScheme: Send + Sync {
    fn derive(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Argon2id hashing with a fresh salt per credential, PHC string output.
pub struct Argon2Scheme;

impl CredentialScheme for Argon2Scheme {
    fn derive(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StoreError::backend(anyhow::anyhow!(e)))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// A user record. Usernames are case-sensitive and unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub credential: String,
}

pub struct AccountDirectory {
    users: RwLock<HashMap<String, User>>,
    scheme: Box<dyn CredentialScheme>,
}

impl AccountDirectory {
    pub fn new(scheme: Box<dyn CredentialScheme>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            scheme,
        }
    }

    /// Validate the parameters and store a new user with a derived
    /// credential. Nothing is written when validation fails.
    pub fn create_user(&self, username: &str, password: &str) -> Result<()> {
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(ValidationError::UsernameTooShort.into());
        }
        if password.is_empty() {
            return Err(ValidationError::PasswordBlank.into());
        }
        if self.users.read().contains_key(username) {
            return Err(ValidationError::UsernameTaken.into());
        }

        // Hash outside the lock; re-check the name on insert.
        let credential = self.scheme.derive(password)?;
        let mut users = self.users.write();
        if users.contains_key(username) {
            return Err(ValidationError::UsernameTaken.into());
        }
        users.insert(
            username.to_string(),
            User {
                username: username.to_string(),
                credential,
            },
        );
        tracing::debug!(username, "created user");
        Ok(())
    }

    /// Check a username/password pair against the stored credential. Succeeds
    /// silently; authorization tokens are issued separately.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let credential = self
            .users
            .read()
            .get(username)
            .map(|u| u.credential.clone());
        let Some(credential) = credential else {
            return Err(AuthError::UnknownUsername.into());
        };
        if !self.scheme.verify(password, &credential) {
            return Err(AuthError::IncorrectPassword.into());
        }
        Ok(())
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.read().contains_key(username)
    }

    pub(crate) fn export_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    pub(crate) fn import_users(&self, users: Vec<User>) {
        let mut map = self.users.write();
        map.clear();
        for user in users {
            map.insert(user.username.clone(), user);
        }
    }
}
