//! Core domain types for crash-loop detection and safe mode.
//!
//! This crate contains pure domain types with no IO and minimal dependencies.
//! Everything here can be used from any layer of the application: the store,
//! the config loader, and the detector/manager in `relaunch-core`.

mod feature;
mod keys;
mod settings;
mod time;

pub use feature::{AppMode, SafeModeFeature, SafeModeSignal};
pub use keys::{DEFAULT_NAMESPACE, StateKeys, is_protected_key};
pub use settings::{
    CrashLoopConfig, CrashLoopConfigError, DEFAULT_CRASH_THRESHOLD,
    DEFAULT_SAFE_MODE_DURATION_SECS, DEFAULT_TIME_WINDOW_SECS, SafeModeConfig,
    SafeModeConfigError,
};
pub use time::Timestamp;
