//! Resolved configuration types shared across crates.
//!
//! These types represent fully-validated configuration state. Raw
//! deserialization structs stay private; the `#[serde(try_from)]` boundary
//! resolves them into these types, so holding a value is proof of validity.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::feature::SafeModeFeature;
use crate::keys::is_protected_key;

pub const DEFAULT_CRASH_THRESHOLD: u32 = 3;
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 300;
pub const DEFAULT_SAFE_MODE_DURATION_SECS: u64 = 3600;

const DEFAULT_CORRUPTIBLE_CACHES: [&str; 2] = ["cached_home_feed", "cached_banner"];

const fn default_crash_threshold() -> u32 {
    DEFAULT_CRASH_THRESHOLD
}

const fn default_time_window_secs() -> u64 {
    DEFAULT_TIME_WINDOW_SECS
}

const fn default_safe_mode_duration_secs() -> u64 {
    DEFAULT_SAFE_MODE_DURATION_SECS
}

fn default_disabled_features() -> Vec<SafeModeFeature> {
    SafeModeFeature::DEFAULT_DISABLED.to_vec()
}

fn default_corruptible_caches() -> Vec<String> {
    DEFAULT_CORRUPTIBLE_CACHES
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrashLoopConfigError {
    #[error("crash_threshold must be at least 1")]
    ZeroThreshold,
    #[error("time_window_seconds must be greater than zero")]
    ZeroTimeWindow,
    #[error("safe_mode_duration_seconds must be greater than zero")]
    ZeroSafeModeDuration,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCrashLoopConfig {
    #[serde(default = "default_crash_threshold")]
    crash_threshold: u32,
    #[serde(default = "default_time_window_secs")]
    time_window_seconds: u64,
    #[serde(default = "default_safe_mode_duration_secs")]
    safe_mode_duration_seconds: u64,
}

/// Crash-loop detection parameters.
///
/// Invariant: `crash_threshold >= 1` and both durations are non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCrashLoopConfig")]
pub struct CrashLoopConfig {
    crash_threshold: u32,
    time_window: Duration,
    safe_mode_duration: Duration,
}

impl TryFrom<RawCrashLoopConfig> for CrashLoopConfig {
    type Error = CrashLoopConfigError;

    fn try_from(raw: RawCrashLoopConfig) -> Result<Self, Self::Error> {
        Self::new(
            raw.crash_threshold,
            Duration::from_secs(raw.time_window_seconds),
            Duration::from_secs(raw.safe_mode_duration_seconds),
        )
    }
}

impl CrashLoopConfig {
    pub fn new(
        crash_threshold: u32,
        time_window: Duration,
        safe_mode_duration: Duration,
    ) -> Result<Self, CrashLoopConfigError> {
        if crash_threshold == 0 {
            return Err(CrashLoopConfigError::ZeroThreshold);
        }
        if time_window.is_zero() {
            return Err(CrashLoopConfigError::ZeroTimeWindow);
        }
        if safe_mode_duration.is_zero() {
            return Err(CrashLoopConfigError::ZeroSafeModeDuration);
        }
        Ok(Self {
            crash_threshold,
            time_window,
            safe_mode_duration,
        })
    }

    /// Number of crashes inside the window that triggers safe mode.
    #[must_use]
    pub fn crash_threshold(&self) -> u32 {
        self.crash_threshold
    }

    /// How far back a crash still counts as recent.
    #[must_use]
    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    /// How long safe mode stays on once triggered, independent of further crashes.
    #[must_use]
    pub fn safe_mode_duration(&self) -> Duration {
        self.safe_mode_duration
    }
}

impl Default for CrashLoopConfig {
    fn default() -> Self {
        Self {
            crash_threshold: DEFAULT_CRASH_THRESHOLD,
            time_window: Duration::from_secs(DEFAULT_TIME_WINDOW_SECS),
            safe_mode_duration: Duration::from_secs(DEFAULT_SAFE_MODE_DURATION_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafeModeConfigError {
    #[error("corruptible cache names must not be empty")]
    EmptyCacheName,
    #[error("corruptible cache name {0:?} must be a bare name, not a path")]
    PathLikeCacheName(String),
    #[error("corruptible cache name {0:?} refers to protected credentials or launch state")]
    ProtectedCacheName(String),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSafeModeConfig {
    #[serde(default = "default_disabled_features")]
    disabled_features: Vec<SafeModeFeature>,
    #[serde(default = "default_corruptible_caches")]
    corruptible_caches: Vec<String>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
}

/// What safe mode turns off and what it clears.
///
/// Invariant: every name in `corruptible_caches` is a bare, non-empty name
/// that is not a protected key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSafeModeConfig")]
pub struct SafeModeConfig {
    disabled_features: BTreeSet<SafeModeFeature>,
    corruptible_caches: Vec<String>,
    cache_dir: Option<PathBuf>,
}

impl TryFrom<RawSafeModeConfig> for SafeModeConfig {
    type Error = SafeModeConfigError;

    fn try_from(raw: RawSafeModeConfig) -> Result<Self, Self::Error> {
        Self::new(
            raw.disabled_features,
            raw.corruptible_caches,
            raw.cache_dir,
        )
    }
}

impl SafeModeConfig {
    pub fn new(
        disabled_features: impl IntoIterator<Item = SafeModeFeature>,
        corruptible_caches: impl IntoIterator<Item = String>,
        cache_dir: Option<PathBuf>,
    ) -> Result<Self, SafeModeConfigError> {
        let mut caches = Vec::new();
        for name in corruptible_caches {
            let name = name.trim().to_string();
            validate_cache_name(&name)?;
            if !caches.contains(&name) {
                caches.push(name);
            }
        }
        Ok(Self {
            disabled_features: disabled_features.into_iter().collect(),
            corruptible_caches: caches,
            cache_dir,
        })
    }

    #[must_use]
    pub fn disabled_features(&self) -> &BTreeSet<SafeModeFeature> {
        &self.disabled_features
    }

    /// Names of application caches that may hold corrupt state.
    ///
    /// Each name is both a file/directory under [`Self::cache_dir`] and a key
    /// in the persistent store.
    #[must_use]
    pub fn corruptible_caches(&self) -> &[String] {
        &self.corruptible_caches
    }

    #[must_use]
    pub fn cache_dir(&self) -> Option<&PathBuf> {
        self.cache_dir.as_ref()
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self {
            disabled_features: SafeModeFeature::default_disabled(),
            corruptible_caches: default_corruptible_caches(),
            cache_dir: None,
        }
    }
}

fn validate_cache_name(name: &str) -> Result<(), SafeModeConfigError> {
    if name.is_empty() {
        return Err(SafeModeConfigError::EmptyCacheName);
    }
    if name.contains('/') || name.contains('\\') || name == "." || name.contains("..") {
        return Err(SafeModeConfigError::PathLikeCacheName(name.to_string()));
    }
    if is_protected_key(name) {
        return Err(SafeModeConfigError::ProtectedCacheName(name.to_string()));
    }
    Ok(())
}
