//! Durable key-value storage for launch state.
//!
//! The detector and manager consume storage only through
//! [`PersistentStateStore`]. Two implementations ship here:
//!
//! - [`MemoryStore`]: process-local map, for tests and ephemeral hosts
//! - [`JsonFileStore`]: one JSON document on disk, written atomically

mod document;
mod error;
mod json_file;
mod memory;

pub use error::{StorageError, StoreFault};
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Scalar and small-list storage keyed by string, durable across restarts.
///
/// Absent keys read as `Ok(None)`. A present value of the wrong shape is a
/// [`StorageError::Read`] with [`StoreFault::TypeMismatch`].
pub trait PersistentStateStore: Send + Sync {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StorageError>;
    fn set_bool(&self, key: &str, value: bool) -> Result<(), StorageError>;

    fn get_number(&self, key: &str) -> Result<Option<f64>, StorageError>;
    fn set_number(&self, key: &str, value: f64) -> Result<(), StorageError>;

    fn get_number_list(&self, key: &str) -> Result<Option<Vec<f64>>, StorageError>;
    fn set_number_list(&self, key: &str, values: &[f64]) -> Result<(), StorageError>;

    fn get_string(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Returns whether a value was present.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
}
