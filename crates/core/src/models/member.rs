//! Room member and participant identity models

use serde::{Deserialize, Serialize};

/// Display name used when a participant leaves theirs blank
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// A participant currently subscribed to a room channel.
///
/// The id is the transport connection id, so two members may share a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Which side of the settings/start protocol a participant plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Trusted to publish settings and start the session
    Host,
    Follower,
}

impl Role {
    pub fn from_host_flag(is_host: bool) -> Self {
        if is_host {
            Role::Host
        } else {
            Role::Follower
        }
    }

    pub fn is_host(self) -> bool {
        self == Role::Host
    }
}

/// The local participant as asserted when joining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(name: &str, role: Role) -> Self {
        let name = name.trim();
        Self {
            name: if name.is_empty() {
                DEFAULT_PLAYER_NAME.to_string()
            } else {
                name.to_string()
            },
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_defaults_blank_name() {
        let id = Identity::new("   ", Role::Follower);
        assert_eq!(id.name, DEFAULT_PLAYER_NAME);

        let id = Identity::new(" Ada ", Role::Host);
        assert_eq!(id.name, "Ada");
        assert!(id.role.is_host());
    }
}
