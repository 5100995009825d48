//! Crash-loop detection and safe-mode feature gating.
//!
//! ```text
//! process start ──> CrashLoopDetector::check_on_launch() ──true──> SafeModeManager::activate_safe_mode()
//!                          │                                          │  clear caches (detached)
//!                          │                                          │  disable risky features
//!                          │                                          │  analytics + SafeModeSignal::Activated
//! first frame   ──> mark_becoming_active()                            │
//! anywhere      ─────────────────────────────────────────────> is_feature_enabled(feature)
//! graceful exit ──> mark_clean_shutdown()
//! ```
//!
//! [`LaunchCoordinator`] wires the two halves together in that order.

mod bus;
mod cleanup;
mod clock;
mod detector;
mod effects;
mod launch;
mod manager;

pub use bus::SafeModeBus;
pub use cleanup::{CleanupHandle, CleanupOutcome, CleanupReport, CleanupStep};
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{CrashLoopDetector, LaunchState};
pub use effects::{
    AnalyticsEvent, AnalyticsSink, CachePurge, DirectoryCache, NoopCache, RecordingAnalytics,
    SideEffectError, TracingAnalytics,
};
pub use launch::{LaunchCoordinator, LaunchOutcome, open_state_store};
pub use manager::{SAFE_MODE_ACTIVATED_EVENT, SAFE_MODE_EXITED_EVENT, SafeModeManager};

pub use relaunch_types::{
    AppMode, CrashLoopConfig, SafeModeConfig, SafeModeFeature, SafeModeSignal, StateKeys,
    Timestamp,
};
