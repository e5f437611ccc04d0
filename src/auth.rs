//! Authorization registry: scoped access grants keyed by `(username, token)`.
//!
//! A grant binds a requesting host and user to a normalized permission scope.
//! Token ids are random and opaque; grants live until explicitly revoked.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::paths;

const TOKEN_BYTES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    Read,
    Write,
}

/// A normalized permission scope: directory prefix to granted levels,
/// ordered by prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope(BTreeMap<String, BTreeSet<AccessLevel>>);

impl Scope {
    /// Add the levels for a raw category, normalizing it to its prefix form.
    pub fn grant(&mut self, category: &str, levels: impl IntoIterator<Item = AccessLevel>) {
        let prefix = paths::normalize_category(category);
        self.0.entry(prefix).or_default().extend(levels);
    }

    /// Whether the longest prefix covering `path` permits `level`.
    pub fn allows(&self, path: &str, level: AccessLevel) -> bool {
        match paths::longest_matching_prefix(path, self.0.keys().map(String::as_str)) {
            Some(prefix) => self.0[prefix].contains(&level),
            None => false,
        }
    }

    pub fn get(&self, prefix: &str) -> Option<&BTreeSet<AccessLevel>> {
        self.0.get(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<AccessLevel>)> {
        self.0.iter().map(|(prefix, levels)| (prefix.as_str(), levels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A scoped access grant, read-only after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: String,
    pub username: String,
    pub host: String,
    pub scope: Scope,
    pub issued_at: DateTime<Utc>,
}

/// How a storage call is authorized. `Trusted` marks callers the surrounding
/// layer has already validated out-of-band; `Scoped` carries a token whose
/// scope is checked against the target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Trusted,
    Scoped(String),
}

impl Access {
    pub fn scoped(token: impl Into<String>) -> Self {
        Access::Scoped(token.into())
    }
}

#[derive(Default)]
pub struct AuthRegistry {
    grants: RwLock<HashMap<(String, String), Grant>>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh grant for `username` on behalf of `host` and return its
    /// token id. A user may hold any number of concurrent grants.
    pub fn authorize(
        &self,
        host: &str,
        username: &str,
        permissions: &[(&str, Vec<AccessLevel>)],
    ) -> String {
        let mut scope = Scope::default();
        for (category, levels) in permissions {
            scope.grant(category, levels.iter().copied());
        }
        let id = fresh_token();
        let grant = Grant {
            id: id.clone(),
            username: username.to_string(),
            host: host.to_string(),
            scope,
            issued_at: Utc::now(),
        };
        self.grants
            .write()
            .insert((username.to_string(), id.clone()), grant);
        tracing::debug!(username, host, "issued grant");
        id
    }

    /// The normalized scope of a grant, or `None` if the token does not
    /// exist or does not belong to `username`.
    pub fn permissions(&self, username: &str, token: &str) -> Option<Scope> {
        self.grants
            .read()
            .get(&(username.to_string(), token.to_string()))
            .map(|g| g.scope.clone())
    }

    /// Resolve `access` against a path. `Trusted` always passes; a scoped
    /// token passes iff its grant's longest matching prefix permits `level`.
    pub fn check_access(
        &self,
        username: &str,
        access: &Access,
        path: &str,
        level: AccessLevel,
    ) -> bool {
        match access {
            Access::Trusted => true,
            Access::Scoped(token) => self
                .grants
                .read()
                .get(&(username.to_string(), token.clone()))
                .is_some_and(|g| g.scope.allows(path, level)),
        }
    }

    /// Remove a grant. Returns whether one existed.
    pub fn revoke(&self, username: &str, token: &str) -> bool {
        let removed = self
            .grants
            .write()
            .remove(&(username.to_string(), token.to_string()))
            .is_some();
        if removed {
            tracing::debug!(username, "revoked grant");
        }
        removed
    }

    pub(crate) fn export_grants(&self) -> Vec<Grant> {
        let mut grants: Vec<Grant> = self.grants.read().values().cloned().collect();
        grants.sort_by(|a, b| (&a.username, &a.id).cmp(&(&b.username, &b.id)));
        grants
    }

    pub(crate) fn import_grants(&self, grants: Vec<Grant>) {
        let mut map = self.grants.write();
        map.clear();
        for grant in grants {
            map.insert((grant.username.clone(), grant.id.clone()), grant);
        }
    }
}

fn fresh_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccessLevel::{Read, Write};

    fn boris_token(registry: &AuthRegistry) -> String {
        registry.authorize(
            "www.example.com",
            "boris",
            &[
                ("documents", vec![Write]),
                ("photos", vec![Read, Write]),
                ("contacts", vec![Read]),
                ("deep/dir", vec![Read, Write]),
            ],
        )
    }

    #[test]
    fn scope_is_normalized_and_ordered() {
        let registry = AuthRegistry::new();
        let token = boris_token(&registry);
        let scope = registry.permissions("boris", &token).unwrap();

        let prefixes: Vec<&str> = scope.iter().map(|(p, _)| p).collect();
        assert_eq!(
            prefixes,
            vec!["/contacts/", "/deep/dir/", "/documents/", "/photos/"]
        );
        assert_eq!(
            scope.get("/photos/"),
            Some(&BTreeSet::from([Read, Write]))
        );
        assert_eq!(scope.get("/contacts/"), Some(&BTreeSet::from([Read])));
    }

    #[test]
    fn empty_category_normalizes_to_root() {
        let registry = AuthRegistry::new();
        let token = registry.authorize("admin.example.com", "zebcoe", &[("", vec![Read, Write])]);
        let scope = registry.permissions("zebcoe", &token).unwrap();
        assert_eq!(scope.get("/"), Some(&BTreeSet::from([Read, Write])));
        assert!(scope.allows("/anything/at/all", Write));
    }

    #[test]
    fn longest_prefix_decides() {
        let mut scope = Scope::default();
        scope.grant("", [Read]);
        scope.grant("photos", [Read, Write]);

        assert!(scope.allows("/photos/zipwire", Write));
        assert!(scope.allows("/contacts/anna", Read));
        assert!(!scope.allows("/contacts/anna", Write));
    }

    #[test]
    fn tokens_are_fresh_and_bound_to_user() {
        let registry = AuthRegistry::new();
        let a = boris_token(&registry);
        let b = boris_token(&registry);
        assert_ne!(a, b);
        assert!(!a.is_empty());

        assert!(registry.permissions("boris", &a).is_some());
        assert!(registry.permissions("zebcoe", &a).is_none());
        assert!(registry.permissions("boris", "made-up").is_none());
    }

    #[test]
    fn check_access_resolves_scope() {
        let registry = AuthRegistry::new();
        let token = boris_token(&registry);
        let access = Access::scoped(token.as_str());

        assert!(registry.check_access("boris", &access, "/photos/zipwire", Read));
        assert!(registry.check_access("boris", &access, "/documents/plan", Write));
        assert!(!registry.check_access("boris", &access, "/documents/plan", Read));
        assert!(!registry.check_access("boris", &access, "/contacts/anna", Write));
        assert!(!registry.check_access("boris", &access, "/private/diary", Read));
        assert!(!registry.check_access("zebcoe", &access, "/photos/zipwire", Read));
    }

    #[test]
    fn trusted_access_bypasses_scopes() {
        let registry = AuthRegistry::new();
        assert!(registry.check_access("boris", &Access::Trusted, "/anywhere", Write));
    }

    #[test]
    fn revoked_grants_stop_resolving() {
        let registry = AuthRegistry::new();
        let token = boris_token(&registry);

        assert!(registry.revoke("boris", &token));
        assert!(registry.permissions("boris", &token).is_none());
        let access = Access::scoped(token.as_str());
        assert!(!registry.check_access("boris", &access, "/photos/zipwire", Read));
        assert!(!registry.revoke("boris", &token));
    }
}
