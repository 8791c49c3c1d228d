//! WordArena presence transport
//!
//! A small Pusher-style relay for room channels.
//!
//! # Architecture
//!
//! - **Server**: Relay that tracks presence channel membership and fans out client events
//! - **Client**: Connects to a relay, subscribes to channels, triggers events
//! - **Auth**: Signs per-connection channel credentials (HMAC-SHA256)
//! - **Protocol**: Length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(addr, Authorizer::new(key, secret)).await?;
//!
//! let mut client = Client::connect(server.addr(), key).await?;
//! client.subscribe("presence-room-W-7K3P", "Ada").await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ChannelEvent::Event { event, data, .. } => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use auth::{AuthRequest, Authorizer, ChannelAuth};
pub use client::{ChannelEvent, Client, ConnectionState};
pub use error::{Error, Result};
pub use protocol::{is_presence_channel, Message, PresenceMember, UserInfo};
pub use server::Server;

/// Default port for WordArena relays
pub const DEFAULT_PORT: u16 = 7340;
