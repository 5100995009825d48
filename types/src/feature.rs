//! Feature gating vocabulary shared by the manager and its subscribers.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A capability that safe mode may switch off.
///
/// This is a closed enum: subsystems ask the manager about one of these,
/// never about free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeModeFeature {
    ExperimentalUi,
    ThirdPartyAnalytics,
    ServerDrivenUi,
    VideoPlayback,
    AnimatedBanners,
    WebViews,
    PushNotifications,
    BackgroundSync,
}

impl SafeModeFeature {
    pub const ALL: [Self; 8] = [
        Self::ExperimentalUi,
        Self::ThirdPartyAnalytics,
        Self::ServerDrivenUi,
        Self::VideoPlayback,
        Self::AnimatedBanners,
        Self::WebViews,
        Self::PushNotifications,
        Self::BackgroundSync,
    ];

    /// Features disabled by safe mode unless the config says otherwise.
    pub const DEFAULT_DISABLED: [Self; 5] = [
        Self::ExperimentalUi,
        Self::ThirdPartyAnalytics,
        Self::VideoPlayback,
        Self::AnimatedBanners,
        Self::ServerDrivenUi,
    ];

    #[must_use]
    pub fn default_disabled() -> BTreeSet<Self> {
        Self::DEFAULT_DISABLED.into_iter().collect()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExperimentalUi => "experimental_ui",
            Self::ThirdPartyAnalytics => "third_party_analytics",
            Self::ServerDrivenUi => "server_driven_ui",
            Self::VideoPlayback => "video_playback",
            Self::AnimatedBanners => "animated_banners",
            Self::WebViews => "web_views",
            Self::PushNotifications => "push_notifications",
            Self::BackgroundSync => "background_sync",
        }
    }
}

impl fmt::Display for SafeModeFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating mode as observed by the rest of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Normal,
    SafeMode,
}

impl AppMode {
    #[must_use]
    pub const fn is_safe_mode(self) -> bool {
        matches!(self, Self::SafeMode)
    }
}

/// Broadcast on the safe-mode bus when the manager changes mode.
///
/// Carries no payload; subscribers query the manager for details and must
/// react idempotently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeModeSignal {
    Activated,
    Deactivated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disabled_is_subset_of_all() {
        let all: BTreeSet<_> = SafeModeFeature::ALL.into_iter().collect();
        assert!(SafeModeFeature::default_disabled().is_subset(&all));
        assert_eq!(SafeModeFeature::default_disabled().len(), 5);
    }

    #[test]
    fn default_disabled_leaves_push_and_sync_enabled() {
        let disabled = SafeModeFeature::default_disabled();
        assert!(!disabled.contains(&SafeModeFeature::PushNotifications));
        assert!(!disabled.contains(&SafeModeFeature::BackgroundSync));
        assert!(!disabled.contains(&SafeModeFeature::WebViews));
    }

    #[test]
    fn serde_names_match_as_str() {
        for feature in SafeModeFeature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.as_str()));
        }
    }

    #[test]
    fn app_mode_defaults_to_normal() {
        assert_eq!(AppMode::default(), AppMode::Normal);
        assert!(AppMode::SafeMode.is_safe_mode());
    }
}
