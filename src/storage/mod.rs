//! Storage engine: a flat per-user document store plus the derived
//! directory tree.
//!
//! Documents are keyed by path in a sorted map. Directories are not stored
//! as nodes; an auxiliary index tracks, per directory prefix, how many
//! documents live beneath it and the most recent modification among them.
//! `put` materializes missing ancestors and bubbles its timestamp up the
//! walk; `delete` prunes the now-empty tail of the ancestor chain.
//!
//! Mutations against one user serialize on that user's tree lock, so readers
//! observe either all of a mutation or none of it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::{Access, AccessLevel, AuthRegistry};
use crate::error::{Result, StoreError};
use crate::paths;

/// A stored document. `modified` doubles as the optimistic-concurrency
/// version marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub content_type: String,
    pub content: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// One entry in a directory listing. Directory names carry a trailing `/`;
/// their `modified` is the bubbled maximum of everything beneath them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// What a successful `get` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Document {
        content_type: String,
        modified: DateTime<Utc>,
        content: Vec<u8>,
    },
    Listing(Vec<DirEntry>),
}

/// Precondition for `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The document must not exist yet.
    Absent,
    /// The document must exist with exactly this modification timestamp.
    At(DateTime<Utc>),
}

/// Outcome of a successful `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub created: bool,
    pub modified: DateTime<Utc>,
}

/// Index entry for one materialized directory.
#[derive(Debug, Clone, Copy)]
struct DirNode {
    docs_below: usize,
    modified: DateTime<Utc>,
}

/// One user's documents and the directory index derived from them.
#[derive(Default)]
struct UserTree {
    documents: BTreeMap<String, DocumentRecord>,
    directories: BTreeMap<String, DirNode>,
}

impl UserTree {
    fn put(
        &mut self,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
        expected: Option<ExpectedVersion>,
    ) -> Result<PutOutcome> {
        let current = self.documents.get(path);
        let conflict = match expected {
            Some(ExpectedVersion::Absent) => current.is_some(),
            Some(ExpectedVersion::At(version)) => {
                current.map_or(true, |doc| doc.modified != version)
            }
            None => false,
        };
        if conflict {
            return Err(StoreError::VersionConflict {
                path: path.to_string(),
            });
        }

        let created = current.is_none();
        let modified = Utc::now();
        self.documents.insert(
            path.to_string(),
            DocumentRecord {
                content_type: content_type.to_string(),
                content,
                modified,
            },
        );
        for ancestor in paths::ancestors_of(path) {
            let node = self
                .directories
                .entry(ancestor.to_string())
                .or_insert(DirNode {
                    docs_below: 0,
                    modified,
                });
            if created {
                node.docs_below += 1;
            }
            if node.modified < modified {
                node.modified = modified;
            }
        }
        Ok(PutOutcome { created, modified })
    }

    fn delete(&mut self, path: &str) -> bool {
        if self.documents.remove(path).is_none() {
            return false;
        }
        for ancestor in paths::ancestors_of(path) {
            let remaining = match self.directories.get(ancestor) {
                Some(node) => node.docs_below.saturating_sub(1),
                None => continue,
            };
            if remaining == 0 {
                self.directories.remove(ancestor);
                continue;
            }
            // The removed document may have carried the maximum timestamp;
            // re-derive it from the survivors.
            let max = self.max_modified_below(ancestor);
            if let Some(node) = self.directories.get_mut(ancestor) {
                node.docs_below = remaining;
                if let Some(max) = max {
                    node.modified = max;
                }
            }
        }
        true
    }

    fn document(&self, path: &str) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    /// Immediate children of a directory, ordered by name, or `None` when no
    /// document exists beneath it.
    fn list(&self, prefix: &str) -> Option<Vec<DirEntry>> {
        if !self.directories.contains_key(prefix) {
            return None;
        }
        let mut entries: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for (path, doc) in self.subtree_documents(prefix) {
            let rest = &path[prefix.len()..];
            if !rest.contains('/') {
                entries.insert(rest.to_string(), doc.modified);
            }
        }
        for (dir, node) in self
            .directories
            .range(prefix.to_string()..)
            .take_while(|(d, _)| d.starts_with(prefix))
        {
            if dir.as_str() == prefix {
                continue;
            }
            let rest = &dir[prefix.len()..];
            // Immediate subdirectory: its only slash is the trailing one.
            if rest[..rest.len() - 1].contains('/') {
                continue;
            }
            entries.insert(rest.to_string(), node.modified);
        }
        Some(
            entries
                .into_iter()
                .map(|(name, modified)| DirEntry { name, modified })
                .collect(),
        )
    }

    fn subtree_documents<'a>(
        &'a self,
        prefix: &str,
    ) -> impl Iterator<Item = (&'a String, &'a DocumentRecord)> + 'a {
        let prefix = prefix.to_string();
        self.documents
            .range(prefix.clone()..)
            .take_while(move |(p, _)| p.starts_with(&prefix))
    }

    fn max_modified_below(&self, prefix: &str) -> Option<DateTime<Utc>> {
        self.subtree_documents(prefix)
            .map(|(_, doc)| doc.modified)
            .max()
    }

    /// Rebuild the directory index from the flat document set.
    fn reindex(&mut self) {
        self.directories.clear();
        let docs: Vec<(String, DateTime<Utc>)> = self
            .documents
            .iter()
            .map(|(p, d)| (p.clone(), d.modified))
            .collect();
        for (path, modified) in docs {
            for ancestor in paths::ancestors_of(&path) {
                let node = self
                    .directories
                    .entry(ancestor.to_string())
                    .or_insert(DirNode {
                        docs_below: 0,
                        modified,
                    });
                node.docs_below += 1;
                if node.modified < modified {
                    node.modified = modified;
                }
            }
        }
    }
}

pub struct StorageEngine {
    auth: Arc<AuthRegistry>,
    trees: RwLock<HashMap<String, Arc<RwLock<UserTree>>>>,
}

impl StorageEngine {
    pub fn new(auth: Arc<AuthRegistry>) -> Self {
        Self {
            auth,
            trees: RwLock::new(HashMap::new()),
        }
    }

    /// Create or overwrite the document at `path`. Missing ancestor
    /// directories materialize and every ancestor's bubbled timestamp is
    /// raised to the write timestamp.
    pub fn put(
        &self,
        username: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
        expected: Option<ExpectedVersion>,
        access: &Access,
    ) -> Result<PutOutcome> {
        if !paths::is_valid_document_path(path) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.require(username, access, path, AccessLevel::Write)?;
        let tree = self.tree(username);
        let mut tree = tree.write();
        let outcome = tree.put(path, content_type, content, expected)?;
        tracing::debug!(username, path, created = outcome.created, "put document");
        Ok(outcome)
    }

    /// Fetch a document, or the listing of a directory-shaped path. Absence
    /// is `Ok(None)`, not an error.
    pub fn get(&self, username: &str, path: &str, access: &Access) -> Result<Option<Resource>> {
        let directory = paths::is_directory_path(path);
        let valid = if directory {
            paths::is_valid_directory_path(path)
        } else {
            paths::is_valid_document_path(path)
        };
        if !valid {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        // Access is checked before any lookup so a denial reveals nothing
        // about existence.
        self.require(username, access, path, AccessLevel::Read)?;
        let Some(tree) = self.peek(username) else {
            return Ok(None);
        };
        let tree = tree.read();
        if directory {
            Ok(tree.list(path).map(Resource::Listing))
        } else {
            Ok(tree.document(path).map(|doc| Resource::Document {
                content_type: doc.content_type.clone(),
                modified: doc.modified,
                content: doc.content.clone(),
            }))
        }
    }

    /// Remove the document at `path`, pruning ancestor directories left with
    /// nothing beneath them. Returns whether a document was removed.
    pub fn delete(&self, username: &str, path: &str, access: &Access) -> Result<bool> {
        if !paths::is_valid_document_path(path) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.require(username, access, path, AccessLevel::Write)?;
        let Some(tree) = self.peek(username) else {
            return Ok(false);
        };
        let deleted = tree.write().delete(path);
        if deleted {
            tracing::debug!(username, path, "deleted document");
        }
        Ok(deleted)
    }

    fn require(
        &self,
        username: &str,
        access: &Access,
        path: &str,
        level: AccessLevel,
    ) -> Result<()> {
        if self.auth.check_access(username, access, path, level) {
            Ok(())
        } else {
            Err(StoreError::PermissionDenied {
                path: path.to_string(),
            })
        }
    }

    fn tree(&self, username: &str) -> Arc<RwLock<UserTree>> {
        if let Some(tree) = self.trees.read().get(username) {
            return tree.clone();
        }
        self.trees
            .write()
            .entry(username.to_string())
            .or_default()
            .clone()
    }

    fn peek(&self, username: &str) -> Option<Arc<RwLock<UserTree>>> {
        self.trees.read().get(username).cloned()
    }

    pub(crate) fn export_documents(&self) -> BTreeMap<String, Vec<(String, DocumentRecord)>> {
        let trees = self.trees.read();
        let mut out = BTreeMap::new();
        for (username, tree) in trees.iter() {
            let tree = tree.read();
            if tree.documents.is_empty() {
                continue;
            }
            let docs = tree
                .documents
                .iter()
                .map(|(path, doc)| (path.clone(), doc.clone()))
                .collect();
            out.insert(username.clone(), docs);
        }
        out
    }

    pub(crate) fn import_documents(&self, username: &str, docs: Vec<(String, DocumentRecord)>) {
        let tree = self.tree(username);
        let mut tree = tree.write();
        tree.documents = docs.into_iter().collect();
        tree.reindex();
    }
}
