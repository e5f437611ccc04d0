//! Disk persistence for the full store state.
//!
//! Layout under the snapshot directory:
//!
//! ```text
//! users.json            account records
//! grants.json           authorization grants
//! docs-<user>.json      one flat document list per user; the username is
//!                       base64-url encoded in the file name, document
//!                       content is base64 in the record
//! ```
//!
//! Loading rebuilds the in-memory state and re-derives the directory index
//! from the flat document set. I/O and JSON failures surface as
//! [`StoreError::Backend`].

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::User;
use crate::auth::Grant;
use crate::error::{Result, StoreError};
use crate::storage::DocumentRecord;
use crate::store::Store;

const USERS_FILE: &str = "users.json";
const GRANTS_FILE: &str = "grants.json";
const DOCS_PREFIX: &str = "docs-";

#[derive(Serialize, Deserialize)]
struct DocumentFile {
    username: String,
    documents: Vec<PersistedDocument>,
}

#[derive(Serialize, Deserialize)]
struct PersistedDocument {
    path: String,
    content_type: String,
    modified: DateTime<Utc>,
    content: String,
}

/// Write the complete store state into `dir`, replacing any snapshot
/// already there.
pub fn save(dir: &Path, store: &Store) -> Result<()> {
    fs::create_dir_all(dir).map_err(StoreError::backend)?;

    write_json(&dir.join(USERS_FILE), &store.accounts().export_users())?;
    write_json(&dir.join(GRANTS_FILE), &store.auth().export_grants())?;

    // Drop document files from a previous snapshot before writing the
    // current set, so vanished users do not resurrect on load.
    for entry in fs::read_dir(dir).map_err(StoreError::backend)? {
        let entry = entry.map_err(StoreError::backend)?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(DOCS_PREFIX) && name.ends_with(".json") {
                fs::remove_file(entry.path()).map_err(StoreError::backend)?;
            }
        }
    }

    for (username, docs) in store.storage().export_documents() {
        let file = DocumentFile {
            username: username.clone(),
            documents: docs
                .into_iter()
                .map(|(path, doc)| PersistedDocument {
                    path,
                    content_type: doc.content_type,
                    modified: doc.modified,
                    content: URL_SAFE_NO_PAD.encode(doc.content),
                })
                .collect(),
        };
        write_json(&dir.join(docs_file_name(&username)), &file)?;
    }
    tracing::info!(dir = %dir.display(), "saved store snapshot");
    Ok(())
}

/// Rebuild a store from a snapshot directory written by [`save`]. Missing
/// files are treated as empty registries.
pub fn load_into(dir: &Path, store: &Store) -> Result<()> {
    if let Some(users) = read_json::<Vec<User>>(&dir.join(USERS_FILE))? {
        store.accounts().import_users(users);
    }
    if let Some(grants) = read_json::<Vec<Grant>>(&dir.join(GRANTS_FILE))? {
        store.auth().import_grants(grants);
    }

    for entry in fs::read_dir(dir).map_err(StoreError::backend)? {
        let entry = entry.map_err(StoreError::backend)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(DOCS_PREFIX) || !name.ends_with(".json") {
            continue;
        }
        let Some(file) = read_json::<DocumentFile>(&entry.path())? else {
            continue;
        };
        let docs = file
            .documents
            .into_iter()
            .map(|doc| {
                let content = URL_SAFE_NO_PAD
                    .decode(doc.content.as_bytes())
                    .map_err(StoreError::backend)?;
                Ok((
                    doc.path,
                    DocumentRecord {
                        content_type: doc.content_type,
                        content,
                        modified: doc.modified,
                    },
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        store.storage().import_documents(&file.username, docs);
    }
    tracing::info!(dir = %dir.display(), "loaded store snapshot");
    Ok(())
}

fn docs_file_name(username: &str) -> String {
    format!(
        "{}{}.json",
        DOCS_PREFIX,
        URL_SAFE_NO_PAD.encode(username.as_bytes())
    )
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).map_err(StoreError::backend)?;
    fs::write(path, data).map_err(StoreError::backend)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::backend(e)),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(StoreError::backend)
}
