//! Runtime safe-mode restrictions and the side effects of entering them.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use relaunch_store::PersistentStateStore;
use relaunch_types::{AppMode, SafeModeConfig, SafeModeFeature, SafeModeSignal};

use crate::bus::SafeModeBus;
use crate::cleanup::{CleanupHandle, CleanupJob};
use crate::clock::Clock;
use crate::effects::{AnalyticsEvent, AnalyticsSink, CachePurge, NoopCache, TracingAnalytics};

pub const SAFE_MODE_ACTIVATED_EVENT: &str = "safe_mode_activated";
pub const SAFE_MODE_EXITED_EVENT: &str = "safe_mode_exited";

#[derive(Debug, Default)]
struct ManagerState {
    active: bool,
    disabled: BTreeSet<SafeModeFeature>,
}

/// Answers "is feature X enabled right now" for the rest of the process.
///
/// All mutation goes through [`Self::activate_safe_mode`] and
/// [`Self::exit_safe_mode`]; queries take a shared lock.
pub struct SafeModeManager {
    config: SafeModeConfig,
    store: Arc<dyn PersistentStateStore>,
    url_cache: Arc<dyn CachePurge>,
    image_cache: Arc<dyn CachePurge>,
    analytics: Arc<dyn AnalyticsSink>,
    bus: SafeModeBus,
    clock: Arc<dyn Clock>,
    inline_cleanup: bool,
    state: RwLock<ManagerState>,
}

impl SafeModeManager {
    /// A manager with no URL/image cache, `tracing`-backed analytics and a
    /// private bus. Use the `with_*` builders to attach real collaborators.
    pub fn new(
        config: SafeModeConfig,
        store: Arc<dyn PersistentStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            url_cache: Arc::new(NoopCache),
            image_cache: Arc::new(NoopCache),
            analytics: Arc::new(TracingAnalytics),
            bus: SafeModeBus::new(),
            clock,
            inline_cleanup: false,
            state: RwLock::new(ManagerState::default()),
        }
    }

    #[must_use]
    pub fn with_url_cache(mut self, cache: Arc<dyn CachePurge>) -> Self {
        self.url_cache = cache;
        self
    }

    #[must_use]
    pub fn with_image_cache(mut self, cache: Arc<dyn CachePurge>) -> Self {
        self.image_cache = cache;
        self
    }

    #[must_use]
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: SafeModeBus) -> Self {
        self.bus = bus;
        self
    }

    /// Run activation cleanup on the calling thread instead of a worker.
    ///
    /// For hosts that cannot spare a thread at launch. Activation then returns
    /// only after every cleanup step has run.
    #[must_use]
    pub fn with_inline_cleanup(mut self, inline: bool) -> Self {
        self.inline_cleanup = inline;
        self
    }

    #[must_use]
    pub fn bus(&self) -> &SafeModeBus {
        &self.bus
    }

    #[must_use]
    pub fn config(&self) -> &SafeModeConfig {
        &self.config
    }

    /// Enter safe mode for the rest of this process.
    ///
    /// Cache clearing starts on a detached worker and is not awaited. The
    /// disabled set, the analytics event and the broadcast happen before this
    /// returns, whatever the cleanup does. A second call while active does
    /// nothing and returns a skipped handle.
    pub fn activate_safe_mode(&self) -> CleanupHandle {
        {
            let mut state = self.write();
            if state.active {
                tracing::debug!("Safe mode already active; ignoring activation");
                return CleanupHandle::skipped();
            }
            state.disabled.clone_from(self.config.disabled_features());
            state.active = true;
        }

        // Started outside the lock; inline cleanup must not stall readers.
        let job = CleanupJob {
            url_cache: Arc::clone(&self.url_cache),
            image_cache: Arc::clone(&self.image_cache),
            store: Arc::clone(&self.store),
            cache_dir: self.config.cache_dir().cloned(),
            caches: self.config.corruptible_caches().to_vec(),
        };
        let cleanup = if self.inline_cleanup {
            job.run_inline()
        } else {
            job.spawn()
        };

        let now = self.clock.now();
        let disabled: Vec<Value> = self
            .config
            .disabled_features()
            .iter()
            .map(|f| Value::from(f.as_str()))
            .collect();
        tracing::warn!(
            disabled = disabled.len(),
            "Entering safe mode; risky features disabled"
        );
        self.analytics.log_event(
            AnalyticsEvent::new(SAFE_MODE_ACTIVATED_EVENT, now)
                .with_property("activated_at", now.as_epoch_secs())
                .with_property("disabled_features", disabled),
        );
        self.bus.publish(SafeModeSignal::Activated);
        cleanup
    }

    /// True unless safe mode is active and `feature` is in the disabled set.
    #[must_use]
    pub fn is_feature_enabled(&self, feature: SafeModeFeature) -> bool {
        let state = self.read();
        !(state.active && state.disabled.contains(&feature))
    }

    /// Lift the in-process restrictions.
    ///
    /// The persisted trigger is left alone: the next launch inside its
    /// duration enters safe mode again.
    pub fn exit_safe_mode(&self) {
        {
            let mut state = self.write();
            if !state.active {
                tracing::debug!("Safe mode not active; nothing to exit");
                return;
            }
            state.disabled.clear();
            state.active = false;
        }

        tracing::info!("Exited safe mode on request");
        self.analytics
            .log_event(AnalyticsEvent::new(SAFE_MODE_EXITED_EVENT, self.clock.now()));
        self.bus.publish(SafeModeSignal::Deactivated);
    }

    #[must_use]
    pub fn mode(&self) -> AppMode {
        if self.read().active {
            AppMode::SafeMode
        } else {
            AppMode::Normal
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.read().active
    }

    /// Features currently switched off. Empty outside safe mode.
    #[must_use]
    pub fn disabled_features(&self) -> BTreeSet<SafeModeFeature> {
        self.read().disabled.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Mutex, OnceLock, Weak};

    use relaunch_store::MemoryStore;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::clock::ManualClock;
    use crate::effects::{RecordingAnalytics, SideEffectError};

    struct FailingCache;

    impl CachePurge for FailingCache {
        fn purge(&self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no cache directory"))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        analytics: Arc<RecordingAnalytics>,
        manager: SafeModeManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let analytics = Arc::new(RecordingAnalytics::new());
        let manager = SafeModeManager::new(
            SafeModeConfig::default(),
            store.clone(),
            Arc::new(ManualClock::at_secs(1_000.0)),
        )
        .with_analytics(analytics.clone());
        Fixture {
            store,
            analytics,
            manager,
        }
    }

    #[test]
    fn everything_enabled_outside_safe_mode() {
        let f = fixture();
        assert_eq!(f.manager.mode(), AppMode::Normal);
        for feature in SafeModeFeature::ALL {
            assert!(f.manager.is_feature_enabled(feature), "{feature}");
        }
        assert!(f.manager.disabled_features().is_empty());
    }

    #[test]
    fn only_default_set_is_disabled_in_safe_mode() {
        let f = fixture();
        let _ = f.manager.activate_safe_mode().wait();

        assert_eq!(f.manager.mode(), AppMode::SafeMode);
        for feature in SafeModeFeature::ALL {
            let expected = !SafeModeFeature::DEFAULT_DISABLED.contains(&feature);
            assert_eq!(f.manager.is_feature_enabled(feature), expected, "{feature}");
        }
        assert!(f.manager.is_feature_enabled(SafeModeFeature::PushNotifications));
        assert!(!f.manager.is_feature_enabled(SafeModeFeature::VideoPlayback));
    }

    #[test]
    fn activation_logs_once_and_broadcasts_once() {
        let f = fixture();
        let mut rx = f.manager.bus().subscribe();

        let _ = f.manager.activate_safe_mode().wait();
        let second = f.manager.activate_safe_mode();

        assert!(second.is_skipped());
        assert_eq!(f.analytics.count(SAFE_MODE_ACTIVATED_EVENT), 1);
        let event = &f.analytics.events()[0];
        assert_eq!(event.properties["activated_at"], Value::from(1_000.0));
        assert_eq!(rx.try_recv(), Ok(SafeModeSignal::Activated));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn failing_cleanup_does_not_block_gating_or_signals() {
        let f = fixture();
        let manager = f
            .manager
            .with_url_cache(Arc::new(FailingCache))
            .with_image_cache(Arc::new(FailingCache));
        let mut rx = manager.bus().subscribe();

        let report = manager.activate_safe_mode().wait();

        assert_eq!(report.failures().count(), 2);
        assert!(matches!(
            report.outcomes()[1].result,
            Err(SideEffectError::ImageCache(_))
        ));
        assert!(!manager.is_feature_enabled(SafeModeFeature::ExperimentalUi));
        assert_eq!(f.analytics.count(SAFE_MODE_ACTIVATED_EVENT), 1);
        assert_eq!(rx.try_recv(), Ok(SafeModeSignal::Activated));
    }

    #[test]
    fn cleanup_clears_corruptible_blobs_and_keeps_credentials() {
        let f = fixture();
        f.store.set_string("cached_home_feed", "[]").unwrap();
        f.store.set_string("cached_banner", "{}").unwrap();
        f.store.set_string("auth_token", "secret").unwrap();

        assert!(f.manager.activate_safe_mode().wait().is_clean());

        assert!(!f.store.contains("cached_home_feed"));
        assert!(!f.store.contains("cached_banner"));
        assert!(f.store.contains("auth_token"));
    }

    #[test]
    fn exit_restores_every_feature_and_broadcasts() {
        let f = fixture();
        let mut rx = f.manager.bus().subscribe();
        let _ = f.manager.activate_safe_mode().wait();

        f.manager.exit_safe_mode();

        assert_eq!(f.manager.mode(), AppMode::Normal);
        for feature in SafeModeFeature::ALL {
            assert!(f.manager.is_feature_enabled(feature));
        }
        assert_eq!(f.analytics.count(SAFE_MODE_EXITED_EVENT), 1);
        assert_eq!(rx.try_recv(), Ok(SafeModeSignal::Activated));
        assert_eq!(rx.try_recv(), Ok(SafeModeSignal::Deactivated));
    }

    /// Asks the manager about a feature while its own cleanup is running.
    struct QueryingCache {
        manager: Arc<OnceLock<Weak<SafeModeManager>>>,
        seen: Mutex<Option<bool>>,
    }

    impl CachePurge for QueryingCache {
        fn purge(&self) -> io::Result<()> {
            let enabled = self
                .manager
                .get()
                .and_then(Weak::upgrade)
                .map(|m| m.is_feature_enabled(SafeModeFeature::ExperimentalUi));
            *self.seen.lock().unwrap() = enabled;
            Ok(())
        }
    }

    #[test]
    fn inline_cleanup_runs_without_holding_the_state_lock() {
        let slot = Arc::new(OnceLock::new());
        let cache = Arc::new(QueryingCache {
            manager: Arc::clone(&slot),
            seen: Mutex::new(None),
        });
        let manager = Arc::new(
            SafeModeManager::new(
                SafeModeConfig::default(),
                Arc::new(MemoryStore::new()),
                Arc::new(ManualClock::at_secs(0.0)),
            )
            .with_url_cache(cache.clone())
            .with_inline_cleanup(true),
        );
        slot.set(Arc::downgrade(&manager)).unwrap();

        let handle = manager.activate_safe_mode();

        assert!(handle.is_finished());
        assert_eq!(*cache.seen.lock().unwrap(), Some(false));
    }

    #[test]
    fn exit_when_inactive_is_a_no_op() {
        let f = fixture();
        let mut rx = f.manager.bus().subscribe();
        f.manager.exit_safe_mode();
        assert_eq!(f.analytics.count(SAFE_MODE_EXITED_EVENT), 0);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn can_reenter_after_exit() {
        let f = fixture();
        let _ = f.manager.activate_safe_mode().wait();
        f.manager.exit_safe_mode();
        let handle = f.manager.activate_safe_mode();
        assert!(!handle.is_skipped());
        let _ = handle.wait();
        assert_eq!(f.analytics.count(SAFE_MODE_ACTIVATED_EVENT), 2);
        assert!(f.manager.is_active());
    }

    #[test]
    fn custom_disabled_set_is_respected() {
        let config = SafeModeConfig::new(
            [SafeModeFeature::WebViews],
            Vec::<String>::new(),
            None,
        )
        .unwrap();
        let manager = SafeModeManager::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::at_secs(0.0)),
        );
        let _ = manager.activate_safe_mode().wait();
        assert!(!manager.is_feature_enabled(SafeModeFeature::WebViews));
        assert!(manager.is_feature_enabled(SafeModeFeature::VideoPlayback));
    }
}
