//! Durable keyed collection of messages backed by a single JSON document.
//!
//! Every write is a full load-merge-save cycle over the whole document.
//! The cycle runs behind one async mutex, so concurrent callers of
//! [`Store::put`] (the HTTP and datagram endpoints, or many requests from
//! either one) can never load the same snapshot and overwrite each
//! other's updates.
//!
//! The document is replaced by writing a sibling `*.tmp` file, syncing it to
//! disk and renaming it into place, so a crash mid-write leaves the previous
//! document intact.
//! Unreadable or unparseable content is treated as an empty mapping and
//! gets overwritten by the next successful `put`.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, info, warn};

use crate::record::{Entry, Record};

/// In-memory view of the document, ordered by key (and therefore by time).
pub type Messages = BTreeMap<String, Entry>;

const EMPTY_DOCUMENT: &[u8] = b"{}";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Recovered locally by [`Store::put`]; the prior content is dropped.
    #[error("store document {} is unreadable: {reason}", .path.display())]
    ReadCorrupt { path: PathBuf, reason: String },

    #[error("failed to write store document {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare store document {}: {source}", .path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct Store {
    path: PathBuf,
    // Guards the whole read-modify-write cycle, not any in-memory data.
    gate: Mutex<()>,
}

impl Store {
    /// Opens the store at `path`, creating parent directories and an empty
    /// document when none exists yet. Existing content is left untouched.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        prepare_document(&path).await?;
        Ok(Self {
            path,
            gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts or overwrites `record` at its key and persists the document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteFailed`] when the document cannot be
    /// replaced. The record is not persisted in that case.
    pub async fn put(&self, record: Record) -> Result<(), StoreError> {
        let _cycle = self.gate.lock().await;

        let mut messages = self.load_or_reset().await;
        let (key, entry) = record.into_entry();
        if messages.insert(key.clone(), entry).is_some() {
            warn!(%key, "key collision, previous entry overwritten");
        }

        self.save(&messages).await?;
        debug!(%key, entries = messages.len(), "store document updated");
        Ok(())
    }

    /// Reads the current document, applying the same recovery rules as
    /// [`Store::put`]. Never writes.
    pub async fn snapshot(&self) -> Messages {
        let _cycle = self.gate.lock().await;
        self.load_or_reset().await
    }

    async fn load_or_reset(&self) -> Messages {
        match self.load().await {
            Ok(messages) => messages,
            Err(error) => {
                warn!(%error, "treating store document as empty");
                Messages::new()
            }
        }
    }

    async fn load(&self) -> Result<Messages, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Messages::new()),
            Err(err) => return Err(self.corrupt(err)),
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Messages::new());
        }

        serde_json::from_slice(&raw).map_err(|err| self.corrupt(err))
    }

    async fn save(&self, messages: &Messages) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(messages)
            .map_err(|err| self.write_failed(io::Error::new(io::ErrorKind::InvalidData, err)))?;

        let staging = staging_path(&self.path);
        let replaced = match write_durably(&staging, &encoded).await {
            Ok(()) => fs::rename(&staging, &self.path).await,
            Err(err) => Err(err),
        };

        if let Err(err) = replaced {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                debug!(error = %cleanup, "failed to remove staging file");
            }
            return Err(self.write_failed(err));
        }

        Ok(())
    }

    fn corrupt(&self, reason: impl ToString) -> StoreError {
        StoreError::ReadCorrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_failed(&self, source: io::Error) -> StoreError {
        StoreError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

async fn prepare_document(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| bootstrap(parent, err))?;
    }

    let created = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await;

    match created {
        Ok(mut file) => {
            file.write_all(EMPTY_DOCUMENT)
                .await
                .map_err(|err| bootstrap(path, err))?;
            file.flush().await.map_err(|err| bootstrap(path, err))?;
            info!(path = %path.display(), "created empty store document");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(bootstrap(path, err)),
    }
}

/// Writes `bytes` and flushes them to disk before returning, so a later
/// rename never exposes a file whose contents are still in flight.
async fn write_durably(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn bootstrap(path: &Path, source: io::Error) -> StoreError {
    StoreError::Bootstrap {
        path: path.to_path_buf(),
        source,
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".tmp");
    path.with_file_name(name)
}
