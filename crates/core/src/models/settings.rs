//! Room settings chosen by the host

use serde::{Deserialize, Serialize};

/// Theme used when the host leaves the theme blank
pub const FREE_THEME: &str = "Free theme";

/// Upper bound for the minutes field
pub const MAX_MINUTES: u32 = 240;

/// Upper bound for the seconds field
pub const MAX_SECONDS: u32 = 59;

/// Longest session a host can configure
pub const MAX_DURATION_SEC: u32 = MAX_MINUTES * 60 + MAX_SECONDS;

/// Validated room configuration as carried by `room-settings`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub duration_sec: u32,
    pub theme: String,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            duration_sec: 5 * 60,
            theme: FREE_THEME.to_string(),
        }
    }
}

/// Raw host input before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDraft {
    pub minutes: i64,
    pub seconds: i64,
    pub theme: String,
}

impl SettingsDraft {
    pub fn new(minutes: i64, seconds: i64, theme: impl Into<String>) -> Self {
        Self {
            minutes,
            seconds,
            theme: theme.into(),
        }
    }

    /// Clamp the fields into range and default a blank theme
    pub fn validate(&self) -> RoomSettings {
        let minutes = self.minutes.clamp(0, i64::from(MAX_MINUTES)) as u32;
        let seconds = self.seconds.clamp(0, i64::from(MAX_SECONDS)) as u32;
        RoomSettings {
            duration_sec: minutes * 60 + seconds,
            theme: theme_or_default(&self.theme),
        }
    }
}

impl Default for SettingsDraft {
    fn default() -> Self {
        Self::new(5, 0, FREE_THEME)
    }
}

/// Trimmed theme, or the free-theme sentinel when blank
pub fn theme_or_default(theme: &str) -> String {
    let theme = theme.trim();
    if theme.is_empty() {
        FREE_THEME.to_string()
    } else {
        theme.to_string()
    }
}
