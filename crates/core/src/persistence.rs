//! Durable storage of the transcript.
//!
//! The transcript is kept under a single key of a string-keyed store as
//! a JSON array of `{id, role, content, timestamp}` records. Transient
//! state never reaches the store.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId, Role};

/// Key the transcript is stored under when nothing else is configured.
pub const DEFAULT_STORAGE_KEY: &str = "chat_messages";

/// Errors of a [`KeyValueStore`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An I/O error from the backing medium.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The store is full.
    #[error("quota exceeded: {requested} bytes requested, {limit} allowed")]
    QuotaExceeded {
        /// Capacity of the store in bytes.
        limit: usize,
        /// Bytes the store would hold after the write.
        requested: usize,
    },
    /// The key cannot be used with this store.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
}

/// Errors of [`TranscriptPersistence`].
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// The transcript could not be serialized.
    #[error("failed to encode transcript: {0}")]
    Encode(#[source] serde_json::Error),
    /// The stored payload is not a list of message records.
    #[error("failed to decode transcript: {0}")]
    Decode(#[source] serde_json::Error),
    /// The payload decoded but a record is not a well-formed message.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// A synchronous string-keyed store.
pub trait KeyValueStore: Send {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    #[inline]
    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    #[inline]
    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// An in-memory store, optionally limited to a number of bytes.
///
/// Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Creates a store holding at most `limit` bytes of values.
    #[inline]
    pub fn with_quota(limit: usize) -> Self {
        Self {
            entries: Default::default(),
            quota: Some(limit),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        let quota = self.quota;
        let mut entries = self.entries();
        if let Some(limit) = quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let requested = others + value.len();
            if requested > limit {
                return Err(StorageError::QuotaExceeded { limit, requested });
            }
        }
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// A store keeping one JSON file per key in a directory.
///
/// Writes go through a temporary file and a rename, so a crash leaves
/// either the old or the new value behind.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store in `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the directory of this store.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_of(key)?;
        match fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        let path = self.path_of(key)?;
        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));

        let res = write_synced(&tmp_path, value.as_bytes())
            .and_then(|()| fs::rename(&tmp_path, &path));
        if let Err(err) = res {
            fs::remove_file(&tmp_path).ok();
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_of(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    id: MessageId,
    role: Role,
    content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

/// Loads and saves the transcript under one key of a [`KeyValueStore`].
pub struct TranscriptPersistence {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl TranscriptPersistence {
    /// Creates an adapter storing the transcript under `key`.
    pub fn new<S, K>(store: S, key: K) -> Self
    where
        S: KeyValueStore + 'static,
        K: Into<String>,
    {
        Self {
            store: Box::new(store),
            key: key.into(),
        }
    }

    /// Returns the storage key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the stored transcript, reporting why it cannot be used.
    ///
    /// A missing key is an empty transcript, not an error.
    pub fn try_load(&self) -> Result<Vec<Message>, PersistenceError> {
        let Some(payload) = self.store.get(&self.key)? else {
            return Ok(vec![]);
        };
        let records: Vec<StoredMessage> =
            serde_json::from_str(&payload).map_err(PersistenceError::Decode)?;

        let mut seen = HashSet::new();
        let mut messages = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            if record.id.as_str().is_empty() {
                return Err(PersistenceError::InvalidRecord(format!(
                    "record {idx} has an empty id"
                )));
            }
            if !seen.insert(record.id.clone()) {
                return Err(PersistenceError::InvalidRecord(format!(
                    "record {idx} reuses id {}",
                    record.id
                )));
            }
            messages.push(Message::settled(
                record.id,
                record.role,
                record.content,
                record.timestamp,
            ));
        }
        Ok(messages)
    }

    /// Loads the stored transcript.
    ///
    /// Never fails: an unreadable or malformed payload is logged and an
    /// empty transcript is returned instead.
    pub fn load(&self) -> Vec<Message> {
        match self.try_load() {
            Ok(messages) => {
                debug!("loaded {} messages", messages.len());
                messages
            }
            Err(err) => {
                warn!("discarding stored transcript: {err}");
                vec![]
            }
        }
    }

    /// Writes the transcript, leaving out messages that are in flight.
    ///
    /// Returns the number of messages written.
    pub fn save(
        &mut self,
        transcript: &[Message],
    ) -> Result<usize, PersistenceError> {
        let records: Vec<StoredMessage> = transcript
            .iter()
            .filter(|m| !m.is_transient())
            .map(|m| StoredMessage {
                id: m.id().clone(),
                role: m.role(),
                content: m.content().to_owned(),
                timestamp: m.timestamp(),
            })
            .collect();
        let payload =
            serde_json::to_string(&records).map_err(PersistenceError::Encode)?;
        self.store.set(&self.key, payload)?;
        trace!("saved {} messages", records.len());
        Ok(records.len())
    }

    /// Removes the stored transcript.
    pub fn erase(&mut self) -> Result<(), PersistenceError> {
        self.store.remove(&self.key)?;
        Ok(())
    }
}
