//! Presence transport message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire.
//! Channel events carry an opaque JSON body; the relay never looks inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channels in this namespace track membership and require authorization
pub const PRESENCE_PREFIX: &str = "presence-";

pub fn is_presence_channel(channel: &str) -> bool {
    channel.starts_with(PRESENCE_PREFIX) && channel.len() > PRESENCE_PREFIX.len()
}

/// Free-form information attached to a presence member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A member as the transport reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub user_id: String,
    #[serde(default)]
    pub user_info: UserInfo,
}

/// Transport protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Client opens a connection for an application key
    Hello { app_key: String },

    /// Relay accepted the connection and assigned an id
    ConnectionEstablished { connection_id: String },

    /// Relay refused the connection
    Rejected { reason: String },

    /// Client asks the authorization endpoint for a channel credential
    AuthRequest { channel: String, name: String },

    /// Credential minted for this connection and channel
    AuthGranted {
        channel: String,
        auth: String,
        channel_data: String,
    },

    /// Authorization endpoint refused the request
    AuthFailed { channel: String, reason: String },

    /// Client subscribes with a credential
    Subscribe {
        channel: String,
        auth: String,
        channel_data: String,
    },

    /// Subscription granted, with the full member snapshot (self included)
    SubscriptionSucceeded {
        channel: String,
        members: Vec<PresenceMember>,
    },

    /// Subscription denied after credential exchange
    SubscriptionError { channel: String, reason: String },

    /// Client leaves a channel
    Unsubscribe { channel: String },

    /// Another connection joined the channel
    MemberAdded {
        channel: String,
        member: PresenceMember,
    },

    /// A connection left the channel
    MemberRemoved { channel: String, user_id: String },

    /// Application message, relayed to every other subscriber
    ClientEvent {
        channel: String,
        event: String,
        data: Value,
        /// Stamped by the relay; ignored when sent by a client
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },

    /// Keepalive
    Ping,

    Pong,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
