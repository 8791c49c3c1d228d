//! Lobby settings: host publication and follower mirroring
//!
//! Every `room-settings` message is a full replacement, never a delta, so
//! applying them in transport order is enough. Nothing here is persisted.

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Role, RoomSettings, SettingsDraft};

/// Local view of the room settings
#[derive(Debug, Clone)]
pub struct LobbySettings {
    role: Role,
    current: RoomSettings,
}

impl LobbySettings {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            current: RoomSettings::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn current(&self) -> &RoomSettings {
        &self.current
    }

    /// Validate a host draft and adopt it locally.
    ///
    /// Returns the settings to broadcast verbatim. Followers are refused.
    pub fn publish(&mut self, draft: &SettingsDraft) -> Result<RoomSettings> {
        if !self.role.is_host() {
            return Err(Error::NotHost("change the room settings"));
        }
        let settings = draft.validate();
        self.current = settings.clone();
        Ok(settings)
    }

    /// Replace the mirror with a received broadcast. Last message wins.
    pub fn apply_remote(&mut self, settings: RoomSettings) -> bool {
        if self.role.is_host() {
            debug!("Host received settings from another participant claiming host");
        }
        if self.current == settings {
            return false;
        }
        self.current = settings;
        true
    }
}
