//! Cache clearing performed when safe mode activates.
//!
//! Runs on a detached worker so that slow or wedged cleanup cannot delay
//! `activate_safe_mode`. Each step is isolated: a failure is recorded and the
//! next step still runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use relaunch_store::PersistentStateStore;
use relaunch_types::is_protected_key;

use crate::effects::{CachePurge, SideEffectError, remove_path};

const WORKER_NAME: &str = "safe-mode-cleanup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    UrlCache,
    ImageCache,
    CacheFile(PathBuf),
    StoreBlob(String),
    Worker,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlCache => f.write_str("url cache"),
            Self::ImageCache => f.write_str("image cache"),
            Self::CacheFile(path) => write!(f, "cache file {}", path.display()),
            Self::StoreBlob(key) => write!(f, "stored blob {key}"),
            Self::Worker => f.write_str("cleanup worker"),
        }
    }
}

#[derive(Debug)]
pub struct CleanupOutcome {
    pub step: CleanupStep,
    pub result: Result<(), SideEffectError>,
}

/// Per-step results of one cleanup run, in execution order.
#[derive(Debug, Default)]
pub struct CleanupReport {
    outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    #[must_use]
    pub fn outcomes(&self) -> &[CleanupOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    fn record(&mut self, step: CleanupStep, result: Result<(), SideEffectError>) {
        if let Err(e) = &result {
            tracing::warn!(step = %step, "Safe mode cleanup step failed: {e}");
        } else {
            tracing::debug!(step = %step, "Safe mode cleanup step done");
        }
        self.outcomes.push(CleanupOutcome { step, result });
    }

    fn worker_panicked() -> Self {
        let mut report = Self::default();
        report.outcomes.push(CleanupOutcome {
            step: CleanupStep::Worker,
            result: Err(SideEffectError::WorkerPanicked),
        });
        report
    }
}

/// Completion handle for a cleanup run.
///
/// Dropping it is the normal fire-and-forget path; the worker keeps running.
#[derive(Debug)]
pub struct CleanupHandle {
    state: HandleState,
}

#[derive(Debug)]
enum HandleState {
    Skipped,
    Finished(CleanupReport),
    Running(JoinHandle<CleanupReport>),
}

impl CleanupHandle {
    /// Nothing was scheduled (safe mode not entered, or already active).
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            state: HandleState::Skipped,
        }
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.state, HandleState::Skipped)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Skipped | HandleState::Finished(_) => true,
            HandleState::Running(handle) => handle.is_finished(),
        }
    }

    /// Block until the run completes.
    #[must_use]
    pub fn wait(self) -> CleanupReport {
        match self.state {
            HandleState::Skipped => CleanupReport::default(),
            HandleState::Finished(report) => report,
            HandleState::Running(handle) => handle.join().unwrap_or_else(|_| {
                tracing::warn!("Safe mode cleanup worker panicked");
                CleanupReport::worker_panicked()
            }),
        }
    }
}

/// Everything one cleanup run touches.
pub(crate) struct CleanupJob {
    pub(crate) url_cache: Arc<dyn CachePurge>,
    pub(crate) image_cache: Arc<dyn CachePurge>,
    pub(crate) store: Arc<dyn PersistentStateStore>,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) caches: Vec<String>,
}

impl CleanupJob {
    /// Start the run on a detached worker, or inline if no thread can be spawned.
    pub(crate) fn spawn(self) -> CleanupHandle {
        let job = Arc::new(self);
        let worker_job = Arc::clone(&job);
        let spawned = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || worker_job.run());
        let state = match spawned {
            Ok(handle) => HandleState::Running(handle),
            Err(e) => {
                tracing::warn!("Could not spawn cleanup worker, running inline: {e}");
                HandleState::Finished(job.run())
            }
        };
        CleanupHandle { state }
    }

    /// Run on the calling thread and return an already finished handle.
    pub(crate) fn run_inline(self) -> CleanupHandle {
        CleanupHandle {
            state: HandleState::Finished(self.run()),
        }
    }

    pub(crate) fn run(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        report.record(
            CleanupStep::UrlCache,
            self.url_cache.purge().map_err(SideEffectError::UrlCache),
        );
        report.record(
            CleanupStep::ImageCache,
            self.image_cache.purge().map_err(SideEffectError::ImageCache),
        );

        for name in &self.caches {
            if is_protected_key(name) {
                report.record(
                    CleanupStep::StoreBlob(name.clone()),
                    Err(SideEffectError::ProtectedKey(name.clone())),
                );
                continue;
            }
            if let Some(dir) = &self.cache_dir {
                let path = dir.join(name);
                let result = remove_path(&path).map_err(|source| SideEffectError::CacheFile {
                    path: path.clone(),
                    source,
                });
                report.record(CleanupStep::CacheFile(path), result);
            }
            let result = self
                .store
                .remove(name)
                .map(|_| ())
                .map_err(|source| SideEffectError::StoreBlob {
                    key: name.clone(),
                    source,
                });
            report.record(CleanupStep::StoreBlob(name.clone()), result);
        }

        tracing::info!(
            steps = report.outcomes.len(),
            failures = report.failures().count(),
            "Safe mode cleanup finished"
        );
        report
    }
}
