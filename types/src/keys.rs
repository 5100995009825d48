//! Durable key layout and the credential protection policy.

/// Namespace used when the host does not configure one.
pub const DEFAULT_NAMESPACE: &str = "relaunch";

const CRASH_TIMESTAMPS: &str = "crash_loop_timestamps";
const SAFE_MODE_ACTIVATED_AT: &str = "safe_mode_activated_at";
const SESSION_STARTED: &str = "session_started_flag";
const LAST_SUCCESSFUL_LAUNCH: &str = "last_successful_launch";

const DURABLE_KEY_NAMES: [&str; 4] = [
    CRASH_TIMESTAMPS,
    SAFE_MODE_ACTIVATED_AT,
    SESSION_STARTED,
    LAST_SUCCESSFUL_LAUNCH,
];

/// Substrings that mark a key as holding credentials.
const CREDENTIAL_MARKERS: [&str; 6] = [
    "auth",
    "credential",
    "password",
    "token",
    "keychain",
    "session_cookie",
];

/// The four durable keys of the launch state, under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeys {
    crash_timestamps: String,
    safe_mode_activated_at: String,
    session_started: String,
    last_successful_launch: String,
}

impl StateKeys {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        let key = |name: &str| format!("{namespace}.{name}");
        Self {
            crash_timestamps: key(CRASH_TIMESTAMPS),
            safe_mode_activated_at: key(SAFE_MODE_ACTIVATED_AT),
            session_started: key(SESSION_STARTED),
            last_successful_launch: key(LAST_SUCCESSFUL_LAUNCH),
        }
    }

    #[must_use]
    pub fn crash_timestamps(&self) -> &str {
        &self.crash_timestamps
    }

    #[must_use]
    pub fn safe_mode_activated_at(&self) -> &str {
        &self.safe_mode_activated_at
    }

    #[must_use]
    pub fn session_started(&self) -> &str {
        &self.session_started
    }

    /// Reserved. Nothing reads or writes it today.
    #[must_use]
    pub fn last_successful_launch(&self) -> &str {
        &self.last_successful_launch
    }
}

impl Default for StateKeys {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Returns true if `key` must never be removed by the safe-mode cleanup path.
///
/// Covers authentication/session credentials and the detector's own durable
/// keys under any namespace.
#[must_use]
pub fn is_protected_key(key: &str) -> bool {
    let lower = key.trim().to_ascii_lowercase();
    CREDENTIAL_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
        || DURABLE_KEY_NAMES.iter().any(|name| {
            lower == *name || lower.ends_with(&format!(".{name}"))
        })
}
