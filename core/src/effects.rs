//! Collaborators the safe-mode manager drives, and their failure modes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value};

use relaunch_store::StorageError;
use relaunch_types::Timestamp;

/// A single cleanup step that failed. Never fatal; collected into a
/// [`crate::CleanupReport`].
#[derive(Debug, thiserror::Error)]
pub enum SideEffectError {
    #[error("failed to clear URL cache: {0}")]
    UrlCache(#[source] io::Error),
    #[error("failed to clear image cache: {0}")]
    ImageCache(#[source] io::Error),
    #[error("failed to remove cache file {}: {source}", .path.display())]
    CacheFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove cached blob `{key}`: {source}")]
    StoreBlob {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("refusing to clear protected key `{0}`")]
    ProtectedKey(String),
    #[error("cleanup worker panicked")]
    WorkerPanicked,
}

/// A cache subsystem that can be invalidated in bulk.
pub trait CachePurge: Send + Sync {
    fn purge(&self) -> io::Result<()>;
}

/// Stand-in for hosts without a given cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl CachePurge for NoopCache {
    fn purge(&self) -> io::Result<()> {
        Ok(())
    }
}

/// A cache kept as files under one directory.
///
/// Purging removes the directory's contents but keeps the directory. A
/// missing directory counts as already purged.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    dir: PathBuf,
}

impl DirectoryCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CachePurge for DirectoryCache {
    fn purge(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        // Keep going after a failed entry; report the first error.
        let mut first_err = None;
        for entry in entries {
            let result = entry.and_then(|entry| remove_path(&entry.path()));
            if let Err(e) = result {
                tracing::debug!(dir = %self.dir.display(), "Cache entry removal failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Remove a file, symlink or directory tree. Missing paths are fine.
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: &'static str,
    pub timestamp: Timestamp,
    pub properties: Map<String, Value>,
}

impl AnalyticsEvent {
    #[must_use]
    pub fn new(name: &'static str, timestamp: Timestamp) -> Self {
        Self {
            name,
            timestamp,
            properties: Map::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Fire-and-forget event logging.
pub trait AnalyticsSink: Send + Sync {
    fn log_event(&self, event: AnalyticsEvent);
}

/// Writes analytics events to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn log_event(&self, event: AnalyticsEvent) {
        let properties = Value::Object(event.properties);
        tracing::info!(
            event = event.name,
            timestamp = %event.timestamp,
            %properties,
            "Analytics event"
        );
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl RecordingAnalytics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name == name)
            .count()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn log_event(&self, event: AnalyticsEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
