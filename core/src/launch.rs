//! Launch-sequence wiring of detector and manager.

use std::sync::Arc;

use relaunch_config::RelaunchConfig;
use relaunch_store::{JsonFileStore, MemoryStore, PersistentStateStore};
use relaunch_types::{AppMode, StateKeys};

use crate::cleanup::CleanupHandle;
use crate::clock::Clock;
use crate::detector::CrashLoopDetector;
use crate::manager::SafeModeManager;

/// Result of [`LaunchCoordinator::on_launch`].
#[derive(Debug)]
pub struct LaunchOutcome {
    pub mode: AppMode,
    /// Cache clearing started by this launch. Skipped in normal mode.
    pub cleanup: CleanupHandle,
}

/// Drives the detector and manager at the host's lifecycle points:
///
/// 1. [`Self::on_launch`] at process start, before any feature query;
/// 2. [`Self::on_became_active`] once the first interactive frame is up;
/// 3. [`Self::on_clean_shutdown`] on every graceful exit path.
pub struct LaunchCoordinator {
    detector: CrashLoopDetector,
    manager: SafeModeManager,
}

impl LaunchCoordinator {
    pub fn new(detector: CrashLoopDetector, manager: SafeModeManager) -> Self {
        Self { detector, manager }
    }

    /// Build both halves from resolved configuration over a shared store.
    pub fn from_config(
        config: &RelaunchConfig,
        store: Arc<dyn PersistentStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detector = CrashLoopDetector::new(
            config.crash_loop().clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
        )
        .with_keys(StateKeys::new(config.namespace()))
        .with_forced_safe_mode(config.force_safe_mode());
        let manager = SafeModeManager::new(config.safe_mode().clone(), store, clock);
        Self::new(detector, manager)
    }

    pub fn on_launch(&self) -> LaunchOutcome {
        if self.detector.check_on_launch() {
            LaunchOutcome {
                mode: AppMode::SafeMode,
                cleanup: self.manager.activate_safe_mode(),
            }
        } else {
            tracing::debug!("Launching in normal mode");
            LaunchOutcome {
                mode: AppMode::Normal,
                cleanup: CleanupHandle::skipped(),
            }
        }
    }

    pub fn on_became_active(&self) {
        self.detector.mark_becoming_active();
    }

    pub fn on_clean_shutdown(&self) {
        self.detector.mark_clean_shutdown();
    }

    #[must_use]
    pub fn detector(&self) -> &CrashLoopDetector {
        &self.detector
    }

    #[must_use]
    pub fn manager(&self) -> &SafeModeManager {
        &self.manager
    }
}

/// Open the JSON launch-state file named by `config`.
///
/// Falls back to an in-memory store when no path resolves or the file cannot
/// be opened. Crash history is then lost at exit, which keeps the app out of
/// safe mode rather than stuck in it.
pub fn open_state_store(config: &RelaunchConfig) -> Arc<dyn PersistentStateStore> {
    let Some(path) = config.state_path() else {
        tracing::warn!("No launch state path; crash history will not persist");
        return Arc::new(MemoryStore::new());
    };
    match JsonFileStore::open(path) {
        Ok(store) => {
            tracing::debug!(path = %path.display(), "Opened launch state store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                "Failed to open launch state store; crash history will not persist: {e}"
            );
            Arc::new(MemoryStore::new())
        }
    }
}
