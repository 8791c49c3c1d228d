//! Room session handle
//!
//! Owns everything one participant holds for one room: the relay client,
//! the member list, lobby settings, start bookkeeping and the countdown.
//! All of it is driven from a single loop, so no handler ever runs
//! concurrently with another.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wordarena_core::{
    Clock, Error as CoreError, Identity, LobbySettings, Member, PresenceChange, PresenceRegistry,
    RoomEvent, RoomId, RoomSettings, SessionStore, SettingsDraft, StartCoordinator, StartOutcome,
    StartPayload, TimerEngine, TimerPhase, TimerState, DEFAULT_PLAYER_NAME, TICK_INTERVAL_MS,
};
use wordarena_net::{ChannelEvent, Client, PresenceMember};

use crate::cadence::Cadence;
use crate::config::ClientCredentials;
use crate::error::Result;

/// Which screen the participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Lobby,
    Session,
}

/// Something the UI should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Subscribed, with the full member list
    Joined(Vec<Member>),
    /// Authorization or subscription refused; not retried
    JoinFailed(String),
    MemberJoined(Member),
    MemberLeft(Member),
    Members(Vec<Member>),
    SettingsChanged(RoomSettings),
    /// Entered (or re-entered) the session view
    SessionStarted {
        payload: StartPayload,
        state: TimerState,
    },
    Tick(TimerState),
    /// Countdown reached zero; writing is disabled for good
    Locked,
    Status(String),
    Disconnected,
}

/// Requests from the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    PublishSettings(SettingsDraft),
    StartGame,
    Write(String),
    ListMembers,
    Leave,
}

/// Explicit per-room session state, released exactly once
pub struct RoomSession {
    room_id: RoomId,
    channel: String,
    identity: Identity,
    client: Option<Client>,
    /// Set once the relay confirms the channel subscription
    subscribed: bool,
    registry: PresenceRegistry,
    settings: LobbySettings,
    coordinator: StartCoordinator,
    timer: TimerEngine,
    cadence: Cadence,
    store: Box<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    view: View,
    draft: String,
    released: bool,
}

impl RoomSession {
    pub fn new(
        room_id: RoomId,
        identity: Identity,
        store: Box<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            channel: room_id.channel_name(),
            settings: LobbySettings::new(identity.role),
            coordinator: StartCoordinator::new(room_id.clone(), identity.role),
            room_id,
            identity,
            client: None,
            subscribed: false,
            registry: PresenceRegistry::new(),
            timer: TimerEngine::new(),
            cadence: Cadence::new(Duration::from_millis(TICK_INTERVAL_MS)),
            store,
            clock,
            view: View::Lobby,
            draft: String::new(),
            released: false,
        }
    }

    /// Connect to the relay and subscribe to the room's presence channel.
    ///
    /// The outcome arrives later as `Joined` or `JoinFailed`.
    pub async fn join(&mut self, creds: &ClientCredentials) -> Result<()> {
        if self.released {
            return Err(CoreError::NotJoined.into());
        }
        if self.client.is_some() {
            return Ok(());
        }

        let client = Client::connect(creds.relay_addr, &creds.app_key).await?;
        client.subscribe(&self.channel, &self.identity.name).await?;
        info!(
            room_id = %self.room_id,
            connection_id = %client.connection_id(),
            role = ?self.identity.role,
            "Joining room"
        );
        self.client = Some(client);
        Ok(())
    }

    /// Switch to the session view, resuming from the store when possible.
    ///
    /// Returns `None` when there is nothing stored; the session then waits
    /// for a `start-game` broadcast.
    pub fn enter_session_view(&mut self) -> Result<Option<SessionEvent>> {
        self.view = View::Session;
        match self.coordinator.resume(self.store.as_ref())? {
            Some(payload) => Ok(Some(self.begin(payload)?)),
            None => {
                info!(room_id = %self.room_id, "Waiting for start-game");
                Ok(None)
            }
        }
    }

    /// Host: validate and broadcast new lobby settings
    pub async fn publish_settings(&mut self, draft: &SettingsDraft) -> Result<RoomSettings> {
        self.subscribed_client()?;
        let settings = self.settings.publish(draft)?;

        let event = RoomEvent::Settings(settings.clone());
        self.subscribed_client()?
            .trigger(&self.channel, event.name(), event.to_data()?)
            .await?;
        info!(
            room_id = %self.room_id,
            duration_sec = settings.duration_sec,
            theme = %settings.theme,
            "Published room settings"
        );
        Ok(settings)
    }

    /// Host: schedule, persist and broadcast the start, then enter the
    /// session view without waiting for anyone else.
    pub async fn start_game(&mut self) -> Result<SessionEvent> {
        self.subscribed_client()?;
        let payload = self.coordinator.start_session(
            self.settings.current(),
            self.clock.now_ms(),
            self.store.as_mut(),
        )?;

        let event = RoomEvent::StartGame(payload.clone());
        self.subscribed_client()?
            .trigger(&self.channel, event.name(), event.to_data()?)
            .await?;
        self.begin(payload)
    }

    /// Append a line to the draft and autosave it. Refused unless the
    /// countdown is running.
    pub fn write(&mut self, line: &str) -> Result<()> {
        if !self.timer.is_editable() {
            return Err(CoreError::SessionLocked.into());
        }
        self.draft.push_str(line);
        self.draft.push('\n');
        self.store.save_draft(&self.room_id, &self.draft)?;
        Ok(())
    }

    /// Wait for the next thing worth showing.
    ///
    /// Returns `None` once there is no connection and no running countdown
    /// left to wait on. Cancel safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if self.client.is_none() && !self.cadence.is_running() {
                return None;
            }

            let step = tokio::select! {
                event = recv_channel(&mut self.client) => Step::Channel(event),
                _ = self.cadence.tick() => Step::Tick,
            };

            let event = match step {
                Step::Channel(Some(event)) => self.handle_channel(event),
                Step::Channel(None) => self.handle_channel(ChannelEvent::Disconnected),
                Step::Tick => self.handle_tick(),
            };
            if event.is_some() {
                return event;
            }
        }
    }

    /// Drive the session from UI commands until `Leave`, the command
    /// channel closing or the UI going away. Always releases the session.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        events: mpsc::Sender<SessionEvent>,
    ) {
        loop {
            let next = tokio::select! {
                cmd = commands.recv() => Next::Command(cmd),
                event = self.next_event() => Next::Event(event),
            };

            let out = match next {
                Next::Command(None) | Next::Command(Some(SessionCommand::Leave)) => break,
                Next::Command(Some(cmd)) => self.handle_command(cmd).await,
                Next::Event(Some(event)) => Some(event),
                Next::Event(None) => {
                    // Nothing left to wait on but the UI
                    match commands.recv().await {
                        None | Some(SessionCommand::Leave) => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
            };

            if let Some(event) = out {
                if events.send(event).await.is_err() {
                    debug!(room_id = %self.room_id, "Event receiver gone");
                    break;
                }
            }
        }
        self.leave().await;
    }

    /// Unsubscribe, then disconnect. Safe to call more than once.
    pub async fn leave(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.subscribed = false;
        self.cadence.stop();
        if let Some(client) = self.client.take() {
            if let Err(e) = client.unsubscribe(&self.channel).await {
                debug!(room_id = %self.room_id, error = %e, "Unsubscribe after connection loss");
            }
            client.disconnect().await;
        }
        self.registry.clear();
        info!(room_id = %self.room_id, "Left room");
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn phase(&self) -> TimerPhase {
        self.timer.phase()
    }

    pub fn timer_state(&self) -> Option<TimerState> {
        self.timer.state()
    }

    pub fn settings(&self) -> &RoomSettings {
        self.settings.current()
    }

    pub fn members(&self) -> &[Member] {
        self.registry.members()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Connected and confirmed as a member of the room channel
    pub fn is_joined(&self) -> bool {
        self.client.is_some() && self.subscribed
    }

    fn subscribed_client(&self) -> Result<&Client> {
        match &self.client {
            Some(client) if self.subscribed => Ok(client),
            _ => Err(CoreError::NotJoined.into()),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> Option<SessionEvent> {
        let result = match cmd {
            SessionCommand::PublishSettings(draft) => self
                .publish_settings(&draft)
                .await
                .map(SessionEvent::SettingsChanged),
            SessionCommand::StartGame => self.start_game().await,
            SessionCommand::Write(line) => match self.write(&line) {
                Ok(()) => return None,
                Err(e) => Err(e),
            },
            SessionCommand::ListMembers => Ok(SessionEvent::Members(self.registry.members().to_vec())),
            SessionCommand::Leave => return None,
        };
        Some(result.unwrap_or_else(|e| SessionEvent::Status(e.to_string())))
    }

    fn handle_channel(&mut self, event: ChannelEvent) -> Option<SessionEvent> {
        match event {
            ChannelEvent::SubscriptionSucceeded { channel, members } if channel == self.channel => {
                let members: Vec<Member> = members.into_iter().map(to_member).collect();
                self.registry.apply(PresenceChange::Snapshot(members));
                self.subscribed = true;
                info!(room_id = %self.room_id, members = self.registry.len(), "Joined room");
                Some(SessionEvent::Joined(self.registry.members().to_vec()))
            }
            ChannelEvent::SubscriptionError { reason, .. } => {
                warn!(room_id = %self.room_id, reason = %reason, "Subscription failed");
                Some(SessionEvent::JoinFailed(format!("Subscription failed: {}", reason)))
            }
            ChannelEvent::AuthorizationFailed { reason, .. } => {
                warn!(room_id = %self.room_id, reason = %reason, "Authorization failed");
                Some(SessionEvent::JoinFailed(format!("Authorization failed: {}", reason)))
            }
            ChannelEvent::MemberAdded { channel, member } if channel == self.channel => {
                let member = to_member(member);
                self.registry
                    .apply(PresenceChange::Added(member.clone()))
                    .then_some(SessionEvent::MemberJoined(member))
            }
            ChannelEvent::MemberRemoved { channel, user_id } if channel == self.channel => {
                let member = self.registry.get(&user_id).cloned()?;
                self.registry.apply(PresenceChange::Removed { id: user_id });
                Some(SessionEvent::MemberLeft(member))
            }
            ChannelEvent::Event {
                channel,
                event,
                data,
                sender,
            } if channel == self.channel => self.handle_room_event(&event, data, sender),
            ChannelEvent::Disconnected => {
                warn!(room_id = %self.room_id, "Lost connection to relay");
                self.client = None;
                self.subscribed = false;
                self.registry.clear();
                Some(SessionEvent::Disconnected)
            }
            _ => {
                debug!(room_id = %self.room_id, "Ignoring event for another channel");
                None
            }
        }
    }

    fn handle_room_event(
        &mut self,
        name: &str,
        data: serde_json::Value,
        sender: Option<String>,
    ) -> Option<SessionEvent> {
        let decoded = match RoomEvent::decode(name, data) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(room_id = %self.room_id, event = %name, "Unknown room event");
                return None;
            }
            Err(e) => {
                debug!(room_id = %self.room_id, event = %name, error = %e, "Malformed room event");
                return None;
            }
        };

        match decoded {
            RoomEvent::Settings(settings) => {
                debug!(room_id = %self.room_id, sender = ?sender, "Received room settings");
                self.settings
                    .apply_remote(settings.clone())
                    .then_some(SessionEvent::SettingsChanged(settings))
            }
            RoomEvent::StartGame(payload) => {
                let outcome = match self.coordinator.receive(payload, self.store.as_mut()) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(room_id = %self.room_id, error = %e, "Could not persist start-game");
                        return Some(SessionEvent::Status(e.to_string()));
                    }
                };
                match outcome {
                    StartOutcome::Started(payload) | StartOutcome::Restarted(payload) => {
                        Some(self.begin(payload).unwrap_or_else(|e| SessionEvent::Status(e.to_string())))
                    }
                    StartOutcome::Duplicate => None,
                }
            }
        }
    }

    fn handle_tick(&mut self) -> Option<SessionEvent> {
        let state = self.timer.tick(self.clock.now_ms());
        if !state.locked {
            return Some(SessionEvent::Tick(state));
        }
        if !self.cadence.stop() {
            return None;
        }
        info!(room_id = %self.room_id, "Session locked");
        Some(SessionEvent::Locked)
    }

    /// Enter the session view for an accepted payload
    fn begin(&mut self, payload: StartPayload) -> Result<SessionEvent> {
        self.view = View::Session;
        if self.draft.is_empty() {
            self.draft = self.store.load_draft(&self.room_id)?.unwrap_or_default();
        }

        let state = self.timer.acquire(payload.clone(), self.clock.now_ms());
        if state.locked {
            self.cadence.stop();
        } else {
            self.cadence.start();
        }
        Ok(SessionEvent::SessionStarted { payload, state })
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cadence.stop();
        if let Some(client) = self.client.take() {
            debug!(room_id = %self.room_id, "Releasing room on drop");
            // Queued ahead of the disconnect caused by dropping the client
            let _ = client.try_unsubscribe(&self.channel);
        }
    }
}

enum Step {
    Channel(Option<ChannelEvent>),
    Tick,
}

enum Next {
    Command(Option<SessionCommand>),
    Event(Option<SessionEvent>),
}

async fn recv_channel(client: &mut Option<Client>) -> Option<ChannelEvent> {
    match client {
        Some(client) => client.next_event().await,
        None => std::future::pending().await,
    }
}

fn to_member(member: PresenceMember) -> Member {
    let name = member
        .user_info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string());
    Member::new(member.user_id, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use wordarena_core::{ManualClock, MemoryStore, Role, SqliteStore};
    use wordarena_net::{Authorizer, Server};

    const T0: i64 = 1_700_000_000_000;

    async fn start_relay() -> (Server, ClientCredentials) {
        let server = Server::start(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            Authorizer::new("test-key", "test-secret"),
        )
        .await
        .unwrap();
        let creds = ClientCredentials {
            relay_addr: server.addr(),
            app_key: "test-key".into(),
        };
        (server, creds)
    }

    fn room() -> RoomId {
        RoomId::parse("W-7K3P").unwrap()
    }

    fn session(name: &str, role: Role, clock: &Arc<ManualClock>) -> RoomSession {
        RoomSession::new(
            room(),
            Identity::new(name, role),
            Box::new(MemoryStore::new()),
            clock.clone(),
        )
    }

    async fn wait_for(
        session: &mut RoomSession,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                match session.next_event().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("session has nothing left to wait on"),
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }

    async fn joined(name: &str, role: Role, clock: &Arc<ManualClock>, creds: &ClientCredentials) -> RoomSession {
        let mut s = session(name, role, clock);
        s.join(creds).await.unwrap();
        wait_for(&mut s, |e| matches!(e, SessionEvent::Joined(_))).await;
        s
    }

    #[tokio::test]
    async fn test_settings_and_start_reach_follower() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));

        let mut host = joined("Host", Role::Host, &clock, &creds).await;
        let mut follower = session("Ada", Role::Follower, &clock);
        follower.join(&creds).await.unwrap();
        match wait_for(&mut follower, |e| matches!(e, SessionEvent::Joined(_))).await {
            SessionEvent::Joined(members) => {
                let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, vec!["Host", "Ada"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        wait_for(&mut host, |e| matches!(e, SessionEvent::MemberJoined(_))).await;

        let published = host
            .publish_settings(&SettingsDraft::new(1, 30, "Seas"))
            .await
            .unwrap();
        assert_eq!(published.duration_sec, 90);
        assert_eq!(host.settings(), &published);

        let got = wait_for(&mut follower, |e| matches!(e, SessionEvent::SettingsChanged(_))).await;
        assert_eq!(got, SessionEvent::SettingsChanged(published.clone()));
        assert_eq!(follower.settings(), &published);

        let started = host.start_game().await.unwrap();
        let SessionEvent::SessionStarted { payload, state } = started else {
            panic!("host did not enter the session view");
        };
        assert_eq!(payload.start_at, T0 + 3000);
        assert_eq!(payload.duration_sec, 90);
        assert_eq!(state.seconds_left, 90);
        assert_eq!(host.view(), View::Session);

        match wait_for(&mut follower, |e| matches!(e, SessionEvent::SessionStarted { .. })).await {
            SessionEvent::SessionStarted { payload: got, .. } => assert_eq!(got, payload),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(follower.view(), View::Session);
        assert_eq!(follower.phase(), TimerPhase::Running);

        host.leave().await;
        follower.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_follower_cannot_publish_or_start() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut follower = joined("Ada", Role::Follower, &clock, &creds).await;

        let draft = SettingsDraft::new(10, 0, "Mine");
        assert!(follower.publish_settings(&draft).await.is_err());
        assert!(follower.start_game().await.is_err());
        assert_eq!(follower.view(), View::Lobby);
        assert_eq!(follower.settings(), &RoomSettings::default());

        follower.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_not_joined_refused() {
        let clock = Arc::new(ManualClock::new(T0));
        let mut host = session("Host", Role::Host, &clock);
        assert!(host.start_game().await.is_err());
        assert!(host.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_countdown_locks_and_refuses_writes() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut host = joined("Host", Role::Host, &clock, &creds).await;

        host.publish_settings(&SettingsDraft::new(0, 10, "")).await.unwrap();
        host.start_game().await.unwrap();
        assert!(host.write("too early").is_ok());

        clock.set(T0 + 3000 + 4_000);
        match wait_for(&mut host, |e| matches!(e, SessionEvent::Tick(_))).await {
            SessionEvent::Tick(state) => assert_eq!(state.seconds_left, 6),
            other => panic!("unexpected {other:?}"),
        }
        host.write("a line").unwrap();

        clock.set(T0 + 3000 + 10_000);
        wait_for(&mut host, |e| *e == SessionEvent::Locked).await;
        assert_eq!(host.phase(), TimerPhase::Locked);
        assert_eq!(
            host.timer_state(),
            Some(TimerState {
                seconds_left: 0,
                locked: true
            })
        );
        assert!(host.write("late").is_err());
        assert_eq!(host.draft(), "too early\na line\n");

        host.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_resume_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wordarena.db");
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));

        let mut host = RoomSession::new(
            room(),
            Identity::new("Host", Role::Host),
            Box::new(SqliteStore::open(&path).unwrap()),
            clock.clone(),
        );
        host.join(&creds).await.unwrap();
        wait_for(&mut host, |e| matches!(e, SessionEvent::Joined(_))).await;
        host.start_game().await.unwrap();
        clock.set(T0 + 3000 + 1000);
        host.write("kept").unwrap();
        host.leave().await;
        drop(host);

        // Same room after a restart, one second before the deadline
        clock.set(T0 + 3000 + 299_000);
        let mut again = RoomSession::new(
            room(),
            Identity::new("Host", Role::Host),
            Box::new(SqliteStore::open(&path).unwrap()),
            clock.clone(),
        );
        match again.enter_session_view().unwrap() {
            Some(SessionEvent::SessionStarted { payload, state }) => {
                assert_eq!(payload.start_at, T0 + 3000);
                assert_eq!(state, TimerState { seconds_left: 1, locked: false });
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(again.draft(), "kept\n");
        assert!(!again.is_joined());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_enter_without_record_waits() {
        let clock = Arc::new(ManualClock::new(T0));
        let mut follower = session("Ada", Role::Follower, &clock);
        assert!(follower.enter_session_view().unwrap().is_none());
        assert_eq!(follower.view(), View::Session);
        assert_eq!(follower.phase(), TimerPhase::WaitingForStart);
        assert!(follower.write("nope").is_err());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent_and_releases_membership() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut host = joined("Host", Role::Host, &clock, &creds).await;
        let mut follower = joined("Ada", Role::Follower, &clock, &creds).await;
        wait_for(&mut host, |e| matches!(e, SessionEvent::MemberJoined(_))).await;

        follower.leave().await;
        follower.leave().await;
        assert!(follower.is_released());
        assert!(!follower.is_joined());

        match wait_for(&mut host, |e| matches!(e, SessionEvent::MemberLeft(_))).await {
            SessionEvent::MemberLeft(member) => assert_eq!(member.name, "Ada"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(host.members().len(), 1);
        assert!(follower.join(&creds).await.is_err());

        host.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_drop_releases_membership() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut host = joined("Host", Role::Host, &clock, &creds).await;
        let follower = joined("Ada", Role::Follower, &clock, &creds).await;
        wait_for(&mut host, |e| matches!(e, SessionEvent::MemberJoined(_))).await;

        drop(follower);
        wait_for(&mut host, |e| matches!(e, SessionEvent::MemberLeft(_))).await;
        assert_eq!(server.channel_members(&room().channel_name()).await.len(), 1);

        host.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_host_actions_wait_for_subscription() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut host = session("Host", Role::Host, &clock);
        host.join(&creds).await.unwrap();

        // Connected, but the relay has not confirmed the subscription yet
        assert!(!host.is_joined());
        assert!(host.publish_settings(&SettingsDraft::new(1, 0, "")).await.is_err());
        assert!(host.start_game().await.is_err());
        assert_eq!(host.view(), View::Lobby);
        assert_eq!(host.phase(), TimerPhase::WaitingForStart);

        wait_for(&mut host, |e| matches!(e, SessionEvent::Joined(_))).await;
        assert!(host.is_joined());
        assert!(host.start_game().await.is_ok());

        host.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_resumed_finished_round_restarts_on_new_start() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0 + 60_000));

        let mut store = MemoryStore::new();
        let old = StartPayload {
            start_at: T0,
            duration_sec: 10,
            theme: "Old".into(),
        };
        store.save_start(&room(), &old).unwrap();
        let mut follower = RoomSession::new(
            room(),
            Identity::new("Ada", Role::Follower),
            Box::new(store),
            clock.clone(),
        );

        match follower.enter_session_view().unwrap() {
            Some(SessionEvent::SessionStarted { payload, state }) => {
                assert_eq!(payload, old);
                assert!(state.locked);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(follower.phase(), TimerPhase::Locked);

        follower.join(&creds).await.unwrap();
        wait_for(&mut follower, |e| matches!(e, SessionEvent::Joined(_))).await;
        let mut host = joined("Host", Role::Host, &clock, &creds).await;
        assert_eq!(host.members().len(), 2);

        host.start_game().await.unwrap();
        match wait_for(&mut follower, |e| matches!(e, SessionEvent::SessionStarted { .. })).await {
            SessionEvent::SessionStarted { payload, state } => {
                assert_eq!(payload.start_at, T0 + 63_000);
                assert!(!state.locked);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(follower.phase(), TimerPhase::Running);
        assert!(follower.write("round two").is_ok());

        host.leave().await;
        follower.leave().await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_repeated_start_game_enters_once() {
        let clock = Arc::new(ManualClock::new(T0));
        let mut follower = session("Ada", Role::Follower, &clock);
        let event = RoomEvent::StartGame(StartPayload {
            start_at: T0 + 3000,
            duration_sec: 60,
            theme: "Fog".into(),
        });
        let data = event.to_data().unwrap();

        let first = follower.handle_room_event(event.name(), data.clone(), Some("host".into()));
        assert!(matches!(first, Some(SessionEvent::SessionStarted { .. })));
        clock.set(T0 + 10_000);
        assert_eq!(follower.handle_room_event(event.name(), data, Some("host".into())), None);
        assert_eq!(follower.phase(), TimerPhase::Running);
        assert_eq!(follower.timer_state().map(|s| s.seconds_left), Some(60));
    }

    #[tokio::test]
    async fn test_refused_subscription_reports_join_failed() {
        let clock = Arc::new(ManualClock::new(T0));
        let mut follower = session("Ada", Role::Follower, &clock);
        let event = follower.handle_channel(ChannelEvent::SubscriptionError {
            channel: room().channel_name(),
            reason: "room full".into(),
        });
        assert_eq!(
            event,
            Some(SessionEvent::JoinFailed("Subscription failed: room full".into()))
        );
        assert!(!follower.is_joined());
        assert!(follower.start_game().await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_app_key_fails_join() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let mut s = session("Ada", Role::Follower, &clock);
        let bad = ClientCredentials {
            app_key: "wrong".into(),
            ..creds
        };
        assert!(s.join(&bad).await.is_err());
        assert!(!s.is_joined());
        server.shutdown();
    }

    #[tokio::test]
    async fn test_run_loop_serves_commands_until_leave() {
        let (server, creds) = start_relay().await;
        let clock = Arc::new(ManualClock::new(T0));
        let host = joined("Host", Role::Host, &clock, &creds).await;

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let task = tokio::spawn(host.run(cmd_rx, event_tx));

        cmd_tx
            .send(SessionCommand::PublishSettings(SettingsDraft::new(300, 99, "")))
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SessionEvent::SettingsChanged(settings) => {
                assert_eq!(settings.duration_sec, 240 * 60 + 59);
            }
            other => panic!("unexpected {other:?}"),
        }

        cmd_tx.send(SessionCommand::ListMembers).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, SessionEvent::Members(ref m) if m.len() == 1));

        cmd_tx.send(SessionCommand::Leave).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..50 {
            if server.channel_members(&room().channel_name()).await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(server.channel_members(&room().channel_name()).await.is_empty());
        server.shutdown();
    }
}
