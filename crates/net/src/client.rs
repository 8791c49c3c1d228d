//! Client connection to a presence relay

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{Message, PresenceMember};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Event received on a subscribed channel
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Subscription granted with the full member snapshot
    SubscriptionSucceeded {
        channel: String,
        members: Vec<PresenceMember>,
    },
    /// Relay refused the subscription
    SubscriptionError { channel: String, reason: String },
    /// Authorization endpoint refused the credential request
    AuthorizationFailed { channel: String, reason: String },
    MemberAdded {
        channel: String,
        member: PresenceMember,
    },
    MemberRemoved { channel: String, user_id: String },
    /// Application message from another subscriber
    Event {
        channel: String,
        event: String,
        data: Value,
        sender: Option<String>,
    },
    /// Connection lost
    Disconnected,
}

/// Client handle for relay operations
pub struct Client {
    connection_id: String,
    state: Arc<RwLock<ClientState>>,
    event_rx: mpsc::Receiver<ChannelEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

struct ClientState {
    connection: ConnectionState,
    /// Channels waiting for a credential, with the name to present
    pending: HashMap<String, String>,
    subscribed: HashSet<String>,
}

enum ClientCommand {
    Subscribe { channel: String, name: String },
    Unsubscribe { channel: String },
    Trigger {
        channel: String,
        event: String,
        data: Value,
    },
    Disconnect,
}

impl Client {
    /// Connect to a relay and complete the handshake
    pub async fn connect(addr: SocketAddr, app_key: &str) -> Result<Self> {
        info!(addr = %addr, "Connecting to relay");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(
            &mut writer,
            &Message::Hello {
                app_key: app_key.to_string(),
            },
        )
        .await?;

        let connection_id = match read_frame(&mut reader).await? {
            Message::ConnectionEstablished { connection_id } => connection_id,
            Message::Rejected { reason } => {
                warn!(reason = %reason, "Connection rejected");
                return Err(Error::Rejected(reason));
            }
            _ => return Err(Error::Protocol("Expected ConnectionEstablished".into())),
        };
        info!(connection_id = %connection_id, "Connected to relay");

        let state = Arc::new(RwLock::new(ClientState {
            connection: ConnectionState::Connected,
            pending: HashMap::new(),
            subscribed: HashSet::new(),
        }));

        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(
            reader,
            writer,
            state.clone(),
            event_tx,
            cmd_rx,
        ));

        Ok(Client {
            connection_id,
            state,
            event_rx,
            cmd_tx,
        })
    }

    /// Id the relay assigned to this connection
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Get the next channel event
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.event_rx.recv().await
    }

    /// Request a credential for `channel` and subscribe with it.
    ///
    /// The outcome arrives as `SubscriptionSucceeded`, `SubscriptionError`
    /// or `AuthorizationFailed`.
    pub async fn subscribe(&self, channel: &str, name: &str) -> Result<()> {
        self.send(ClientCommand::Subscribe {
            channel: channel.to_string(),
            name: name.to_string(),
        })
        .await
    }

    /// Leave a channel; later events for it are dropped
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.send(ClientCommand::Unsubscribe {
            channel: channel.to_string(),
        })
        .await
    }

    /// Queue an unsubscribe without waiting, for teardown paths that
    /// cannot await. Commands are handled in order, so a following
    /// disconnect still sends it first.
    pub fn try_unsubscribe(&self, channel: &str) -> Result<()> {
        self.cmd_tx
            .try_send(ClientCommand::Unsubscribe {
                channel: channel.to_string(),
            })
            .map_err(|_| Error::NotConnected)
    }

    /// Send an application message to the other subscribers of a channel
    pub async fn trigger(&self, channel: &str, event: &str, data: Value) -> Result<()> {
        self.send(ClientCommand::Trigger {
            channel: channel.to_string(),
            event: event.to_string(),
            data,
        })
        .await
    }

    /// Disconnect from the relay
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    /// Get current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    pub async fn is_subscribed(&self, channel: &str) -> bool {
        self.state.read().await.subscribed.contains(channel)
    }

    async fn send(&self, cmd: ClientCommand) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| Error::NotConnected)
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ClientState>>,
    event_tx: mpsc::Sender<ChannelEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(msg) => {
                        if let Some(reply) = handle_relay_message(msg, &state, &event_tx).await {
                            if let Err(e) = write_frame(&mut writer, &reply).await {
                                warn!(error = %e, "Write error");
                                break;
                            }
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Relay closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                let msg = match cmd {
                    Some(ClientCommand::Subscribe { channel, name }) => {
                        state.write().await.pending.insert(channel.clone(), name.clone());
                        Message::AuthRequest { channel, name }
                    }
                    Some(ClientCommand::Unsubscribe { channel }) => {
                        let mut s = state.write().await;
                        s.pending.remove(&channel);
                        s.subscribed.remove(&channel);
                        Message::Unsubscribe { channel }
                    }
                    Some(ClientCommand::Trigger { channel, event, data }) => {
                        Message::ClientEvent { channel, event, data, sender: None }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                };
                if let Err(e) = write_frame(&mut writer, &msg).await {
                    warn!(error = %e, "Write error");
                    break;
                }
            }
        }
    }

    {
        let mut s = state.write().await;
        s.connection = ConnectionState::Disconnected;
        s.pending.clear();
        s.subscribed.clear();
    }
    let _ = event_tx.send(ChannelEvent::Disconnected).await;
    info!("Disconnected from relay");
}

/// Handle a message from the relay. May produce a frame to send back.
async fn handle_relay_message(
    msg: Message,
    state: &Arc<RwLock<ClientState>>,
    event_tx: &mpsc::Sender<ChannelEvent>,
) -> Option<Message> {
    let event = match msg {
        Message::AuthGranted {
            channel,
            auth,
            channel_data,
        } => {
            if !state.read().await.pending.contains_key(&channel) {
                debug!(channel = %channel, "Credential for a channel no longer wanted");
                return None;
            }
            return Some(Message::Subscribe {
                channel,
                auth,
                channel_data,
            });
        }
        Message::AuthFailed { channel, reason } => {
            state.write().await.pending.remove(&channel)?;
            ChannelEvent::AuthorizationFailed { channel, reason }
        }
        Message::SubscriptionSucceeded { channel, members } => {
            {
                let mut s = state.write().await;
                s.pending.remove(&channel)?;
                s.subscribed.insert(channel.clone());
            }
            ChannelEvent::SubscriptionSucceeded { channel, members }
        }
        Message::SubscriptionError { channel, reason } => {
            state.write().await.pending.remove(&channel)?;
            ChannelEvent::SubscriptionError { channel, reason }
        }
        Message::MemberAdded { channel, member } => {
            if !state.read().await.subscribed.contains(&channel) {
                return None;
            }
            ChannelEvent::MemberAdded { channel, member }
        }
        Message::MemberRemoved { channel, user_id } => {
            if !state.read().await.subscribed.contains(&channel) {
                return None;
            }
            ChannelEvent::MemberRemoved { channel, user_id }
        }
        Message::ClientEvent {
            channel,
            event,
            data,
            sender,
        } => {
            if !state.read().await.subscribed.contains(&channel) {
                debug!(channel = %channel, event = %event, "Dropping event for unsubscribed channel");
                return None;
            }
            ChannelEvent::Event {
                channel,
                event,
                data,
                sender,
            }
        }
        Message::Ping => return Some(Message::Pong),
        Message::Pong => {
            debug!("Received pong");
            return None;
        }
        _ => {
            debug!("Ignoring unexpected message");
            return None;
        }
    };

    let _ = event_tx.send(event).await;
    None
}
