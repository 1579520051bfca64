//! Storage backends for the persisted record.

use std::{
    cell::RefCell,
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use thiserror::Error;

use crate::StoredData;

/// Errors raised while loading or saving the persisted record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record file could not be read or written.
    #[error("failed to access stored record at {path:?}: {source}")]
    Io {
        /// Location of the record.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The record could not be parsed.
    #[error("stored record is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    /// The record could not be encoded.
    #[error("failed to encode stored record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Loads and saves the persisted record.
pub trait RecordBackend {
    /// Loads the record, returning `None` when nothing was saved yet.
    fn load(&mut self) -> Result<Option<StoredData>, StoreError>;

    /// Replaces the saved record.
    fn save(&mut self, data: &StoredData) -> Result<(), StoreError>;
}

/// Backend that keeps the record as pretty-printed JSON in a file.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Creates a backend reading and writing the provided path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordBackend for JsonFileBackend {
    fn load(&mut self) -> Result<Option<StoredData>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(StoreError::Corrupt)
    }

    fn save(&mut self, data: &StoredData) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(data).map_err(StoreError::Encode)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, encoded).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Backend that keeps the encoded record in memory.
///
/// Clones share the same slot, so a caller can keep a handle to inspect or
/// tamper with what the store saved.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    slot: Rc<RefCell<Option<String>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-seeded with raw record text.
    #[must_use]
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(contents.into()))),
        }
    }

    /// Raw text of the last saved record.
    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.slot.borrow().clone()
    }
}

impl RecordBackend for MemoryBackend {
    fn load(&mut self) -> Result<Option<StoredData>, StoreError> {
        match self.slot.borrow().as_deref() {
            Some(contents) => serde_json::from_str(contents)
                .map(Some)
                .map_err(StoreError::Corrupt),
            None => Ok(None),
        }
    }

    fn save(&mut self, data: &StoredData) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(data).map_err(StoreError::Encode)?;
        *self.slot.borrow_mut() = Some(encoded);
        Ok(())
    }
}
