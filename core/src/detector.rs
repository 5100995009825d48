//! Launch-time crash-loop detection.
//!
//! Crash signal: `session_started` is set once a launch is judged successful
//! and cleared only on a clean shutdown. Finding it still set at the next
//! launch means the previous process died without reaching a clean exit.
//!
//! Evaluation order on every check:
//! 1. an active trigger (`safe_mode_activated_at` within the duration) keeps
//!    safe mode on without looking at the crash count;
//! 2. an expired trigger is cleared together with the crash history;
//! 3. `crash_threshold` or more recent crashes set a fresh trigger;
//! 4. otherwise normal mode.
//!
//! Persisted state is the source of truth. Storage failures never propagate:
//! unreadable values count as absent (so a storage glitch cannot trap the app
//! in safe mode) and failed writes are logged and dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use relaunch_store::{PersistentStateStore, StorageError};
use relaunch_types::{CrashLoopConfig, StateKeys, Timestamp};

use crate::clock::Clock;

/// Read-only snapshot of the persisted launch state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaunchState {
    pub session_started: bool,
    pub crash_timestamps: Vec<Timestamp>,
    pub safe_mode_activated_at: Option<Timestamp>,
}

/// What this process has already done. Guarded by the detector's mutex, which
/// also serializes every read-modify-write of the persisted state.
#[derive(Debug, Default)]
struct LaunchMemo {
    checked: bool,
    verdict: bool,
}

pub struct CrashLoopDetector {
    config: CrashLoopConfig,
    keys: StateKeys,
    store: Arc<dyn PersistentStateStore>,
    clock: Arc<dyn Clock>,
    force_safe_mode: bool,
    memo: Mutex<LaunchMemo>,
}

impl CrashLoopDetector {
    pub fn new(
        config: CrashLoopConfig,
        store: Arc<dyn PersistentStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            keys: StateKeys::default(),
            store,
            clock,
            force_safe_mode: false,
            memo: Mutex::new(LaunchMemo::default()),
        }
    }

    #[must_use]
    pub fn with_keys(mut self, keys: StateKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Report safe mode from every check regardless of persisted state.
    ///
    /// Nothing extra is persisted, so turning the override off restores the
    /// real verdict on the next launch.
    #[must_use]
    pub fn with_forced_safe_mode(mut self, force: bool) -> Self {
        self.force_safe_mode = force;
        self
    }

    #[must_use]
    pub fn config(&self) -> &CrashLoopConfig {
        &self.config
    }

    #[must_use]
    pub fn keys(&self) -> &StateKeys {
        &self.keys
    }

    /// Decide whether this process starts in safe mode.
    ///
    /// Call once, as early as possible, before any feature query and before
    /// [`Self::mark_becoming_active`]. Only the first call in a process may
    /// record a crash; later calls re-prune and re-evaluate.
    pub fn check_on_launch(&self) -> bool {
        let mut memo = self.lock();
        let now = self.clock.now();
        let mut crashes = self.read_crash_timestamps();

        if !memo.checked {
            memo.checked = true;
            if self.read_session_started() {
                tracing::warn!(at = %now, "Previous session ended abnormally; recording crash");
                crashes.push(now);
            }
        }

        let future = crashes.iter().filter(|t| **t > now).count();
        if future > 0 {
            tracing::warn!(future, now = %now, "Crash records lie in the future; discarding them");
        }
        let cutoff = now.minus(self.config.time_window());
        crashes.retain(|t| *t > cutoff && *t <= now);
        self.write_crash_timestamps(&crashes);

        let mut verdict = self.evaluate(now, crashes);
        if self.force_safe_mode && !verdict {
            tracing::warn!("Safe mode forced by configuration override");
            verdict = true;
        }
        memo.verdict = verdict;
        verdict
    }

    /// The launch reached a usable state; a later abnormal exit is attributed
    /// to this session.
    pub fn mark_becoming_active(&self) {
        let _memo = self.lock();
        if let Err(e) = self.store.set_bool(self.keys.session_started(), true) {
            tracing::warn!("Failed to mark session started: {e}");
        } else {
            tracing::debug!("Session marked active");
        }
    }

    /// Record a graceful exit. Call on every recognized termination path.
    pub fn mark_clean_shutdown(&self) {
        let _memo = self.lock();
        if let Err(e) = self.store.set_bool(self.keys.session_started(), false) {
            tracing::warn!("Failed to mark clean shutdown: {e}");
        } else {
            tracing::debug!("Session marked cleanly shut down");
        }
    }

    /// Verdict of the last [`Self::check_on_launch`] in this process.
    ///
    /// A cache, not the source of truth. False before the first check.
    #[must_use]
    pub fn is_in_safe_mode(&self) -> bool {
        self.lock().verdict
    }

    #[must_use]
    pub fn launch_state(&self) -> LaunchState {
        let _memo = self.lock();
        LaunchState {
            session_started: self.read_session_started(),
            crash_timestamps: self.read_crash_timestamps(),
            safe_mode_activated_at: self.read_activated_at(),
        }
    }

    /// Time left on the persisted trigger, if one is active right now.
    #[must_use]
    pub fn safe_mode_remaining(&self) -> Option<Duration> {
        let _memo = self.lock();
        let activated_at = self.read_activated_at()?;
        let elapsed = self.clock.now().secs_since(activated_at);
        let total = self.config.safe_mode_duration().as_secs_f64();
        (elapsed >= 0.0 && elapsed < total).then(|| Duration::from_secs_f64(total - elapsed))
    }

    fn evaluate(&self, now: Timestamp, mut crashes: Vec<Timestamp>) -> bool {
        if let Some(activated_at) = self.read_activated_at() {
            let elapsed = now.secs_since(activated_at);
            let duration = self.config.safe_mode_duration();
            if elapsed < 0.0 {
                tracing::warn!(
                    activated_at = %activated_at,
                    now = %now,
                    "Safe mode trigger lies in the future; discarding it"
                );
                self.clear_activated_at();
            } else if elapsed < duration.as_secs_f64() {
                tracing::info!(
                    remaining_secs = duration.as_secs_f64() - elapsed,
                    "Safe mode trigger still active"
                );
                return true;
            } else {
                tracing::info!(activated_at = %activated_at, "Safe mode expired; resetting crash history");
                self.clear_activated_at();
                crashes.clear();
                self.write_crash_timestamps(&crashes);
            }
        }

        let threshold = self.config.crash_threshold() as usize;
        if crashes.len() >= threshold {
            tracing::warn!(
                crashes = crashes.len(),
                threshold,
                window_secs = self.config.time_window().as_secs(),
                "Crash loop detected; entering safe mode"
            );
            if let Err(e) = self
                .store
                .set_number(self.keys.safe_mode_activated_at(), now.as_epoch_secs())
            {
                tracing::warn!("Failed to persist safe mode trigger: {e}");
            }
            return true;
        }

        tracing::debug!(crashes = crashes.len(), threshold, "No crash loop");
        false
    }

    fn lock(&self) -> MutexGuard<'_, LaunchMemo> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_session_started(&self) -> bool {
        self.store
            .get_bool(self.keys.session_started())
            .unwrap_or_else(|e| fail_open(&e))
            .unwrap_or(false)
    }

    fn read_crash_timestamps(&self) -> Vec<Timestamp> {
        self.store
            .get_number_list(self.keys.crash_timestamps())
            .unwrap_or_else(|e| fail_open(&e))
            .unwrap_or_default()
            .into_iter()
            .filter_map(Timestamp::from_epoch_secs)
            .collect()
    }

    fn read_activated_at(&self) -> Option<Timestamp> {
        self.store
            .get_number(self.keys.safe_mode_activated_at())
            .unwrap_or_else(|e| fail_open(&e))
            .and_then(Timestamp::from_epoch_secs)
    }

    fn write_crash_timestamps(&self, crashes: &[Timestamp]) {
        let raw: Vec<f64> = crashes.iter().map(|t| t.as_epoch_secs()).collect();
        if let Err(e) = self
            .store
            .set_number_list(self.keys.crash_timestamps(), &raw)
        {
            tracing::warn!("Failed to persist crash history: {e}");
        }
    }

    fn clear_activated_at(&self) {
        if let Err(e) = self.store.remove(self.keys.safe_mode_activated_at()) {
            tracing::warn!("Failed to clear safe mode trigger: {e}");
        }
    }
}

fn fail_open<T>(err: &StorageError) -> Option<T> {
    tracing::warn!(key = err.key(), "Treating unreadable launch state as absent: {err}");
    None
}
