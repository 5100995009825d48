use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use relaunch_utils::{AtomicWriteOptions, atomic_write, recover_bak_file};
use serde_json::Value;

use crate::PersistentStateStore;
use crate::document::{Document, number_list_value, number_value};
use crate::error::{StorageError, StoreFault};

/// Durable store backed by a single JSON object on disk.
///
/// The document is loaded lazily and cached. Every mutation rewrites the file
/// with [`atomic_write`] and only updates the cache once the write has
/// landed, so the in-memory view never runs ahead of the disk.
///
/// A corrupt document surfaces as a read error. The next successful write
/// replaces it with a fresh document holding only the newly written key.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    options: AtomicWriteOptions,
    cache: Mutex<Option<Document>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// Creates the parent directory and restores a `.bak` left behind by an
    /// interrupted write.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        recover_bak_file(&path);
        Ok(Self {
            path,
            options: AtomicWriteOptions::default(),
            cache: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_write_options(mut self, options: AtomicWriteOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<Document>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(path: &Path) -> Result<Document, StoreFault> {
        match fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn read<T>(
        &self,
        key: &str,
        f: impl FnOnce(&Document) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut cache = self.lock();
        let doc = match cache.take() {
            Some(doc) => doc,
            None => Self::load(&self.path).map_err(|e| StorageError::read(key, e))?,
        };
        let out = f(&doc);
        *cache = Some(doc);
        out
    }

    fn write<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Document) -> T,
    ) -> Result<T, StorageError> {
        let mut cache = self.lock();
        let mut next = match cache.as_ref() {
            Some(doc) => doc.clone(),
            None => Self::load(&self.path).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    "Discarding unreadable launch state document: {e}"
                );
                Document::default()
            }),
        };
        let out = f(&mut next);
        let bytes = serde_json::to_vec_pretty(&next).map_err(|e| StorageError::write(key, e))?;
        atomic_write(&self.path, &bytes, self.options).map_err(|e| StorageError::write(key, e))?;
        *cache = Some(next);
        Ok(out)
    }
}

impl PersistentStateStore for JsonFileStore {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StorageError> {
        self.read(key, |doc| doc.get_bool(key))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError> {
        self.write(key, |doc| doc.insert(key, Value::Bool(value)))
    }

    fn get_number(&self, key: &str) -> Result<Option<f64>, StorageError> {
        self.read(key, |doc| doc.get_number(key))
    }

    fn set_number(&self, key: &str, value: f64) -> Result<(), StorageError> {
        let value = number_value(key, value)?;
        self.write(key, |doc| doc.insert(key, value))
    }

    fn get_number_list(&self, key: &str) -> Result<Option<Vec<f64>>, StorageError> {
        self.read(key, |doc| doc.get_number_list(key))
    }

    fn set_number_list(&self, key: &str, values: &[f64]) -> Result<(), StorageError> {
        let value = number_list_value(key, values)?;
        self.write(key, |doc| doc.insert(key, value))
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.read(key, |doc| doc.get_string(key))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(key, |doc| doc.insert(key, Value::String(value.to_string())))
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.write(key, |doc| doc.remove(key))
    }
}
