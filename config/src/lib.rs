//! Configuration loading for crash-loop detection and safe mode.
//!
//! ```toml
//! [crash_loop]
//! crash_threshold = 3
//! time_window_seconds = 300
//! safe_mode_duration_seconds = 3600
//!
//! [safe_mode]
//! disabled_features = ["experimental_ui", "video_playback"]
//! corruptible_caches = ["cached_home_feed", "cached_banner"]
//! cache_dir = "/var/cache/myapp"
//!
//! [store]
//! namespace = "com.example.myapp"
//! path = "/var/lib/myapp/launch_state.json"
//!
//! [debug]
//! force_safe_mode = false
//! ```
//!
//! Every section is optional; missing values fall back to defaults. The file
//! itself is optional too.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use relaunch_types::{CrashLoopConfig, DEFAULT_NAMESPACE, SafeModeConfig};

/// Explicit config file location.
pub const RELAUNCH_CONFIG: &str = "RELAUNCH_CONFIG";
/// Truthy value forces the detector verdict to "safe mode" (QA builds).
pub const RELAUNCH_FORCE_SAFE_MODE: &str = "RELAUNCH_FORCE_SAFE_MODE";

const STATE_FILENAME: &str = "launch_state.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(
        "store namespace {0:?} must be a single non-empty path component without whitespace"
    )]
    InvalidNamespace(String),
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path.as_path()),
            ConfigError::InvalidNamespace(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfigFile {
    crash_loop: Option<CrashLoopConfig>,
    safe_mode: Option<SafeModeConfig>,
    store: Option<StoreSection>,
    debug: Option<DebugSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSection {
    namespace: Option<String>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DebugSection {
    #[serde(default)]
    force_safe_mode: bool,
}

/// Fully resolved configuration, constructed once per process.
#[derive(Debug, Clone)]
pub struct RelaunchConfig {
    crash_loop: CrashLoopConfig,
    safe_mode: SafeModeConfig,
    namespace: String,
    state_path: Option<PathBuf>,
    force_safe_mode: bool,
}

impl Default for RelaunchConfig {
    fn default() -> Self {
        Self {
            crash_loop: CrashLoopConfig::default(),
            safe_mode: SafeModeConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            state_path: None,
            force_safe_mode: false,
        }
    }
}

impl RelaunchConfig {
    /// Load from [`config_path`], apply environment overrides and fill in
    /// platform default directories.
    ///
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match config_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                tracing::debug!("No home directory; using default configuration");
                Self::default()
            }
        };
        Ok(config
            .with_env_overrides()
            .with_platform_defaults())
    }

    /// Load from an explicit path without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&content).map_err(|err| match err {
            ParseFailure::Toml(source) => {
                tracing::warn!(path = %path.display(), "Failed to parse config: {source}");
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            }
            ParseFailure::Namespace(ns) => ConfigError::InvalidNamespace(ns),
        })
    }

    fn parse(content: &str) -> Result<Self, ParseFailure> {
        let raw: RawConfigFile = toml::from_str(content).map_err(ParseFailure::Toml)?;
        let store = raw.store.unwrap_or_default();
        let namespace = match store.namespace {
            Some(ns) if !is_valid_namespace(&ns) => {
                return Err(ParseFailure::Namespace(ns));
            }
            Some(ns) => ns,
            None => DEFAULT_NAMESPACE.to_string(),
        };
        Ok(Self {
            crash_loop: raw.crash_loop.unwrap_or_default(),
            safe_mode: raw.safe_mode.unwrap_or_default(),
            namespace,
            state_path: store.path,
            force_safe_mode: raw.debug.is_some_and(|d| d.force_safe_mode),
        })
    }

    /// Apply `RELAUNCH_FORCE_SAFE_MODE`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if force_safe_mode_by_override() {
            tracing::warn!(
                env_var = RELAUNCH_FORCE_SAFE_MODE,
                "Safe mode forced by environment override"
            );
            self.force_safe_mode = true;
        }
        self
    }

    /// Fill `state_path` and the safe-mode cache directory from the
    /// platform's data and cache directories when the file left them unset.
    #[must_use]
    pub fn with_platform_defaults(mut self) -> Self {
        if self.state_path.is_none() {
            self.state_path =
                dirs::data_local_dir().map(|dir| dir.join(&self.namespace).join(STATE_FILENAME));
        }
        if self.safe_mode.cache_dir().is_none()
            && let Some(cache) = dirs::cache_dir()
        {
            self.safe_mode = self.safe_mode.with_cache_dir(cache.join(&self.namespace));
        }
        self
    }

    #[must_use]
    pub fn crash_loop(&self) -> &CrashLoopConfig {
        &self.crash_loop
    }

    #[must_use]
    pub fn safe_mode(&self) -> &SafeModeConfig {
        &self.safe_mode
    }

    /// Prefix for the durable launch-state keys.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Where the JSON launch-state file lives, if one could be resolved.
    #[must_use]
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    #[must_use]
    pub fn force_safe_mode(&self) -> bool {
        self.force_safe_mode
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Namespace(String),
}

/// `$RELAUNCH_CONFIG` if set, otherwise `~/.relaunch/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(RELAUNCH_CONFIG)
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".relaunch").join("config.toml"))
}

/// The namespace names a directory under the platform data and cache dirs,
/// so it must stay a single plain component.
fn is_valid_namespace(ns: &str) -> bool {
    !ns.is_empty()
        && !ns.chars().any(char::is_whitespace)
        && !ns.contains(['/', '\\'])
        && ns != "."
        && !ns.contains("..")
}

fn force_safe_mode_by_override() -> bool {
    match env::var(RELAUNCH_FORCE_SAFE_MODE) {
        Ok(raw) => is_truthy(raw.as_str()),
        Err(_) => false,
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
