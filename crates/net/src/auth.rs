//! Channel authorization endpoint
//!
//! Mints a per-connection, per-channel credential bound to a display name.
//! Credential format: `<app_key>:<base64 HMAC-SHA256>` over
//! `<connection_id>:<channel>:<channel_data>`, where `channel_data` is the
//! JSON presence record the relay will announce to other members.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{is_presence_channel, PresenceMember, UserInfo};

type HmacSha256 = Hmac<Sha256>;

/// Name announced when a participant leaves theirs blank
pub const DEFAULT_NAME: &str = "Player";

/// Input to the authorization endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub connection_id: String,
    pub channel_name: String,
    pub name: String,
}

/// Opaque credential plus the presence record it vouches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
    pub channel_data: String,
}

/// Signs and verifies channel credentials for one application key
#[derive(Clone)]
pub struct Authorizer {
    app_key: String,
    secret: String,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("app_key", &self.app_key)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    pub fn new(app_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            secret: secret.into(),
        }
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Mint a credential for a presence channel subscription
    pub fn authorize(&self, req: &AuthRequest) -> Result<ChannelAuth> {
        if req.connection_id.is_empty() || req.channel_name.is_empty() {
            return Err(Error::Unauthorized(
                "Missing connection id or channel name".into(),
            ));
        }
        if !is_presence_channel(&req.channel_name) {
            return Err(Error::Unauthorized(format!(
                "Not a presence channel: {}",
                req.channel_name
            )));
        }

        let name = req.name.trim();
        let member = PresenceMember {
            user_id: req.connection_id.clone(),
            user_info: UserInfo {
                name: Some(if name.is_empty() { DEFAULT_NAME } else { name }.to_string()),
            },
        };
        let channel_data = serde_json::to_string(&member)
            .map_err(|e| Error::Protocol(format!("Serialization failed: {}", e)))?;

        let signature = self.sign(&req.connection_id, &req.channel_name, &channel_data)?;
        debug!(channel = %req.channel_name, connection_id = %req.connection_id, "Authorized channel");

        Ok(ChannelAuth {
            auth: format!("{}:{}", self.app_key, STANDARD.encode(signature)),
            channel_data,
        })
    }

    /// Check a credential presented on subscribe and return the member it names
    pub fn verify(
        &self,
        connection_id: &str,
        channel: &str,
        auth: &ChannelAuth,
    ) -> Result<PresenceMember> {
        let (key, signature) = auth
            .auth
            .split_once(':')
            .ok_or_else(|| Error::Unauthorized("Malformed credential".into()))?;
        if key != self.app_key {
            warn!(channel = %channel, "Credential for another application key");
            return Err(Error::Unauthorized("Unknown application key".into()));
        }
        let signature = STANDARD
            .decode(signature)
            .map_err(|_| Error::Unauthorized("Malformed signature".into()))?;

        let mut mac = self.mac()?;
        mac.update(signing_input(connection_id, channel, &auth.channel_data).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| Error::Unauthorized("Invalid signature".into()))?;

        let member: PresenceMember = serde_json::from_str(&auth.channel_data)
            .map_err(|_| Error::Unauthorized("Malformed channel data".into()))?;
        if member.user_id != connection_id {
            return Err(Error::Unauthorized("Credential bound to another connection".into()));
        }
        Ok(member)
    }

    fn sign(&self, connection_id: &str, channel: &str, channel_data: &str) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(signing_input(connection_id, channel, channel_data).as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| Error::Unauthorized("Invalid signing secret".into()))
    }
}

fn signing_input(connection_id: &str, channel: &str, channel_data: &str) -> String {
    format!("{}:{}:{}", connection_id, channel, channel_data)
}
