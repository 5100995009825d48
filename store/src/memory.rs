use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::PersistentStateStore;
use crate::document::{Document, number_list_value, number_value};
use crate::error::{StorageError, StoreFault};

/// In-memory store with optional fault injection.
///
/// Survives nothing, so it stands in for durable storage only in tests and
/// in hosts that deliberately opt out of persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<Document>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with [`StoreFault::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write or remove fail with [`StoreFault::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Store an arbitrary JSON value, bypassing type checks.
    ///
    /// Lets tests plant malformed entries.
    pub fn insert_raw(&self, key: &str, value: Value) {
        self.lock().insert(key, value);
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(
        &self,
        key: &str,
        f: impl FnOnce(&Document) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::read(
                key,
                StoreFault::Unavailable("injected read failure".into()),
            ));
        }
        f(&self.lock())
    }

    fn write<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Document) -> T,
    ) -> Result<T, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::write(
                key,
                StoreFault::Unavailable("injected write failure".into()),
            ));
        }
        Ok(f(&mut self.lock()))
    }
}

impl PersistentStateStore for MemoryStore {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_round_trip() {
        let store = MemoryStore::new();
        store.set_bool("flag", true).unwrap();
        store.set_number("at", 1_000.5).unwrap();
        store.set_number_list("ts", &[1.0, 2.0]).unwrap();

        assert_eq!(store.get_bool("flag").unwrap(), Some(true));
        assert_eq!(store.get_number("at").unwrap(), Some(1_000.5));
        assert_eq!(store.get_number_list("ts").unwrap(), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn injected_read_failure() {
        let store = MemoryStore::new();
        store.set_bool("flag", true).unwrap();
        store.set_fail_reads(true);
        assert!(store.get_bool("flag").unwrap_err().is_read());
        store.set_fail_reads(false);
        assert_eq!(store.get_bool("flag").unwrap(), Some(true));
    }

    #[test]
    fn injected_write_failure_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.set_number("at", 5.0).unwrap();
        store.set_fail_writes(true);
        assert!(store.set_number("at", 6.0).is_err());
        assert!(store.remove("at").is_err());
        assert_eq!(store.get_number("at").unwrap(), Some(5.0));
    }

    #[test]
    fn raw_entries_surface_type_mismatch() {
        let store = MemoryStore::new();
        store.insert_raw("ts", Value::String("garbage".into()));
        assert!(store.get_number_list("ts").is_err());
        assert!(store.remove("ts").unwrap());
        assert_eq!(store.get_number_list("ts").unwrap(), None);
    }
}
