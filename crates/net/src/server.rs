//! Presence relay server
//!
//! Accepts client connections, serves the channel authorization endpoint,
//! tracks presence channel membership and relays client events to the
//! other subscribers of a channel. Holds no room state beyond who is
//! currently subscribed.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{AuthRequest, Authorizer, ChannelAuth};
use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{is_presence_channel, Message, PresenceMember};

/// Maximum number of simultaneous connections
const MAX_CONNECTIONS: usize = 256;

/// Outgoing queue depth per connection
const OUTBOX_DEPTH: usize = 64;

/// Connected client state
struct Connection {
    tx: mpsc::Sender<Message>,
    channels: HashSet<String>,
}

/// Relay state shared across tasks
struct RelayState {
    authorizer: Authorizer,
    connections: HashMap<String, Connection>,
    /// Presence channel members in subscription order
    channels: HashMap<String, Vec<PresenceMember>>,
}

impl RelayState {
    /// Senders for every subscriber of a channel except one connection
    fn subscribers_except(&self, channel: &str, except: &str) -> Vec<mpsc::Sender<Message>> {
        self.channels
            .get(channel)
            .into_iter()
            .flatten()
            .filter(|m| m.user_id != except)
            .filter_map(|m| self.connections.get(&m.user_id))
            .map(|c| c.tx.clone())
            .collect()
    }

    fn sender(&self, connection_id: &str) -> Option<mpsc::Sender<Message>> {
        self.connections.get(connection_id).map(|c| c.tx.clone())
    }

    /// Drop a connection from a channel. Returns the remaining subscribers.
    fn leave_channel(&mut self, connection_id: &str, channel: &str) -> Vec<mpsc::Sender<Message>> {
        if let Some(conn) = self.connections.get_mut(connection_id) {
            conn.channels.remove(channel);
        }
        let Some(members) = self.channels.get_mut(channel) else {
            return Vec::new();
        };
        let before = members.len();
        members.retain(|m| m.user_id != connection_id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.channels.remove(channel);
        }
        if removed {
            self.subscribers_except(channel, connection_id)
        } else {
            Vec::new()
        }
    }
}

/// Relay server handle
pub struct Server {
    addr: SocketAddr,
    state: Arc<RwLock<RelayState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Start a relay on the given address (port 0 picks a free port)
    pub async fn start(addr: SocketAddr, authorizer: Authorizer) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, app_key = %authorizer.app_key(), "Relay started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(RwLock::new(RelayState {
            authorizer,
            connections: HashMap::new(),
            channels: HashMap::new(),
        }));

        let state_clone = state.clone();
        let shutdown_clone = shutdown_tx.clone();
        tokio::spawn(accept_loop(listener, state_clone, shutdown_clone));

        Ok(Server {
            addr: bound_addr,
            state,
            shutdown_tx,
        })
    }

    /// Get the relay's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current members of a channel
    pub async fn channel_members(&self, channel: &str) -> Vec<PresenceMember> {
        self.state
            .read()
            .await
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of open connections
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Stop accepting and close every connection
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Relay shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RwLock<RelayState>>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        let state = state.clone();
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(handle_connection(stream, addr, state, shutdown_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RwLock<RelayState>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let (connection_id, msg_tx, msg_rx) = match handle_hello(&mut reader, &state).await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Connection refused");
            let reason = match e {
                Error::Rejected(reason) => reason,
                other => other.to_string(),
            };
            let _ = write_frame(&mut writer, &Message::Rejected { reason }).await;
            return;
        }
    };

    info!(addr = %addr, connection_id = %connection_id, "Connection established");

    let writer_handle = tokio::spawn(writer_task(writer, msg_rx));
    let _ = msg_tx
        .send(Message::ConnectionEstablished {
            connection_id: connection_id.clone(),
        })
        .await;

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(msg) => handle_message(msg, &connection_id, &state).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(connection_id = %connection_id, "Closing connection for shutdown");
                break;
            }
        }
    }

    remove_connection(&state, &connection_id).await;
    drop(msg_tx);
    writer_handle.abort();

    info!(connection_id = %connection_id, "Connection ended");
}

/// First frame must be Hello with the relay's application key
async fn handle_hello(
    reader: &mut ReadHalf<TcpStream>,
    state: &Arc<RwLock<RelayState>>,
) -> Result<(String, mpsc::Sender<Message>, mpsc::Receiver<Message>)> {
    match read_frame(reader).await? {
        Message::Hello { app_key } => {
            let mut s = state.write().await;

            if app_key != s.authorizer.app_key() {
                return Err(Error::Rejected("Unknown application key".into()));
            }
            if s.connections.len() >= MAX_CONNECTIONS {
                return Err(Error::ServerFull);
            }

            let connection_id = Uuid::new_v4().simple().to_string();
            let (tx, rx) = mpsc::channel(OUTBOX_DEPTH);
            s.connections.insert(
                connection_id.clone(),
                Connection {
                    tx: tx.clone(),
                    channels: HashSet::new(),
                },
            );
            Ok((connection_id, tx, rx))
        }
        _ => Err(Error::Protocol("Expected Hello".into())),
    }
}

/// Writer task - sends messages to the client
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Handle an incoming message
async fn handle_message(msg: Message, connection_id: &str, state: &Arc<RwLock<RelayState>>) {
    match msg {
        Message::AuthRequest { channel, name } => {
            let (reply, to) = {
                let s = state.read().await;
                let req = AuthRequest {
                    connection_id: connection_id.to_string(),
                    channel_name: channel.clone(),
                    name,
                };
                let reply = match s.authorizer.authorize(&req) {
                    Ok(auth) => Message::AuthGranted {
                        channel,
                        auth: auth.auth,
                        channel_data: auth.channel_data,
                    },
                    Err(e) => {
                        warn!(connection_id = %connection_id, channel = %channel, error = %e, "Authorization refused");
                        Message::AuthFailed {
                            channel,
                            reason: e.to_string(),
                        }
                    }
                };
                (reply, s.sender(connection_id))
            };
            send_all(to, reply).await;
        }
        Message::Subscribe {
            channel,
            auth,
            channel_data,
        } => {
            handle_subscribe(state, connection_id, channel, ChannelAuth { auth, channel_data }).await;
        }
        Message::Unsubscribe { channel } => {
            let others = state.write().await.leave_channel(connection_id, &channel);
            debug!(connection_id = %connection_id, channel = %channel, "Unsubscribed");
            for tx in others {
                let _ = tx
                    .send(Message::MemberRemoved {
                        channel: channel.clone(),
                        user_id: connection_id.to_string(),
                    })
                    .await;
            }
        }
        Message::ClientEvent {
            channel,
            event,
            data,
            sender: _,
        } => {
            let targets = {
                let s = state.read().await;
                let subscribed = s
                    .connections
                    .get(connection_id)
                    .is_some_and(|c| c.channels.contains(&channel));
                if !subscribed {
                    debug!(connection_id = %connection_id, channel = %channel, "Dropping event from non-subscriber");
                    return;
                }
                s.subscribers_except(&channel, connection_id)
            };
            debug!(channel = %channel, event = %event, fanout = targets.len(), "Relaying client event");
            let msg = Message::ClientEvent {
                channel,
                event,
                data,
                sender: Some(connection_id.to_string()),
            };
            for tx in targets {
                let _ = tx.send(msg.clone()).await;
            }
        }
        Message::Ping => {
            let to = state.read().await.sender(connection_id);
            send_all(to, Message::Pong).await;
        }
        _ => {
            debug!(connection_id = %connection_id, "Ignoring unexpected message type");
        }
    }
}

/// Verify the credential, record membership and announce the newcomer
async fn handle_subscribe(
    state: &Arc<RwLock<RelayState>>,
    connection_id: &str,
    channel: String,
    auth: ChannelAuth,
) {
    let mut s = state.write().await;
    let Some(self_tx) = s.sender(connection_id) else {
        return;
    };

    let verified = if is_presence_channel(&channel) {
        s.authorizer.verify(connection_id, &channel, &auth)
    } else {
        Err(Error::Unauthorized(format!("Not a presence channel: {}", channel)))
    };
    let member = match verified {
        Ok(member) => member,
        Err(e) => {
            drop(s);
            warn!(connection_id = %connection_id, channel = %channel, error = %e, "Subscription denied");
            let _ = self_tx
                .send(Message::SubscriptionError {
                    channel,
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    };

    let already = s
        .connections
        .get(connection_id)
        .is_some_and(|c| c.channels.contains(&channel));
    if !already {
        s.channels
            .entry(channel.clone())
            .or_default()
            .push(member.clone());
        if let Some(conn) = s.connections.get_mut(connection_id) {
            conn.channels.insert(channel.clone());
        }
    }

    let snapshot = s.channels.get(&channel).cloned().unwrap_or_default();
    let others = if already {
        Vec::new()
    } else {
        s.subscribers_except(&channel, connection_id)
    };
    drop(s);

    info!(connection_id = %connection_id, channel = %channel, members = snapshot.len(), "Subscribed");
    let _ = self_tx
        .send(Message::SubscriptionSucceeded {
            channel: channel.clone(),
            members: snapshot,
        })
        .await;
    for tx in others {
        let _ = tx
            .send(Message::MemberAdded {
                channel: channel.clone(),
                member: member.clone(),
            })
            .await;
    }
}

/// Remove a connection from every channel and announce its departure
async fn remove_connection(state: &Arc<RwLock<RelayState>>, connection_id: &str) {
    let departures = {
        let mut s = state.write().await;
        let channels: Vec<String> = s
            .connections
            .get(connection_id)
            .map(|c| c.channels.iter().cloned().collect())
            .unwrap_or_default();
        let departures: Vec<(String, Vec<mpsc::Sender<Message>>)> = channels
            .into_iter()
            .map(|channel| {
                let others = s.leave_channel(connection_id, &channel);
                (channel, others)
            })
            .collect();
        s.connections.remove(connection_id);
        departures
    };

    for (channel, others) in departures {
        for tx in others {
            let _ = tx
                .send(Message::MemberRemoved {
                    channel: channel.clone(),
                    user_id: connection_id.to_string(),
                })
                .await;
        }
    }
}

async fn send_all(to: Option<mpsc::Sender<Message>>, msg: Message) {
    if let Some(tx) = to {
        let _ = tx.send(msg).await;
    }
}
