//! Shared fixtures for the launch-scenario tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use relaunch_core::{
    CrashLoopConfig, CrashLoopDetector, ManualClock, RecordingAnalytics, SafeModeConfig,
    SafeModeManager,
};
use relaunch_store::PersistentStateStore;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. `RUST_LOG` filters it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn crash_config(threshold: u32, window_secs: u64, duration_secs: u64) -> CrashLoopConfig {
    CrashLoopConfig::new(
        threshold,
        Duration::from_secs(window_secs),
        Duration::from_secs(duration_secs),
    )
    .expect("valid crash loop config")
}

/// One simulated device: durable store and wall clock outlive every process.
pub struct Device {
    pub store: Arc<dyn PersistentStateStore>,
    pub clock: Arc<ManualClock>,
    pub config: CrashLoopConfig,
}

/// The per-process objects a host would construct at startup.
pub struct Process {
    pub detector: CrashLoopDetector,
    pub manager: SafeModeManager,
    pub analytics: Arc<RecordingAnalytics>,
}

impl Device {
    pub fn new(store: Arc<dyn PersistentStateStore>, config: CrashLoopConfig) -> Self {
        init_tracing();
        Self {
            store,
            clock: Arc::new(ManualClock::at_secs(0.0)),
            config,
        }
    }

    /// Start a process at `t` and run the launch check.
    pub fn boot(&self, t: f64) -> (Process, bool) {
        self.clock.set_secs(t);
        let analytics = Arc::new(RecordingAnalytics::new());
        let process = Process {
            detector: CrashLoopDetector::new(
                self.config.clone(),
                Arc::clone(&self.store),
                self.clock.clone(),
            ),
            manager: SafeModeManager::new(
                SafeModeConfig::default(),
                Arc::clone(&self.store),
                self.clock.clone(),
            )
            .with_analytics(analytics.clone()),
            analytics,
        };
        let verdict = process.detector.check_on_launch();
        if verdict {
            let _ = process.manager.activate_safe_mode().wait();
        }
        (process, verdict)
    }

    /// Boot at `t`, become active, then die without a clean shutdown.
    pub fn crash_at(&self, t: f64) -> bool {
        let (process, verdict) = self.boot(t);
        process.detector.mark_becoming_active();
        verdict
    }

    /// Boot at `t`, become active, then exit gracefully.
    pub fn clean_run_at(&self, t: f64) -> bool {
        let (process, verdict) = self.boot(t);
        process.detector.mark_becoming_active();
        process.detector.mark_clean_shutdown();
        verdict
    }
}
