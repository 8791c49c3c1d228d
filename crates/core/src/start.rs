//! Start coordination - moving a room from lobby to session
//!
//! The host schedules a shared start instant a skew buffer into the
//! future and broadcasts it. Everyone, host included, persists the payload
//! per room before switching views, so a restart resumes from storage.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Role, RoomSettings, StartPayload};
use crate::room_id::RoomId;
use crate::storage::SessionStore;

/// What a received `start-game` means for this participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// First payload for this room: enter the session view
    Started(StartPayload),
    /// A payload with a new start instant replaces the current session
    Restarted(StartPayload),
    /// Same session delivered again; nothing to do
    Duplicate,
}

/// Per-room start bookkeeping
#[derive(Debug, Clone)]
pub struct StartCoordinator {
    room_id: RoomId,
    role: Role,
    accepted: Option<StartPayload>,
}

impl StartCoordinator {
    pub fn new(room_id: RoomId, role: Role) -> Self {
        Self {
            room_id,
            role,
            accepted: None,
        }
    }

    pub fn accepted(&self) -> Option<&StartPayload> {
        self.accepted.as_ref()
    }

    /// Host side: schedule and persist a new session.
    ///
    /// The caller broadcasts the returned payload and switches its own view
    /// without waiting for the broadcast to come back.
    pub fn start_session(
        &mut self,
        settings: &RoomSettings,
        now_ms: i64,
        store: &mut dyn SessionStore,
    ) -> Result<StartPayload> {
        if !self.role.is_host() {
            return Err(Error::NotHost("start the session"));
        }
        let payload = StartPayload::scheduled(settings, now_ms);
        store.save_start(&self.room_id, &payload)?;
        info!(
            room_id = %self.room_id,
            start_at = payload.start_at,
            duration_sec = payload.duration_sec,
            "Scheduled session start"
        );
        self.accepted = Some(payload.clone());
        Ok(payload)
    }

    /// Any side: handle a `start-game` broadcast.
    ///
    /// The payload is persisted before the outcome is reported, so a
    /// transition is never visible without its resume record.
    pub fn receive(
        &mut self,
        payload: StartPayload,
        store: &mut dyn SessionStore,
    ) -> Result<StartOutcome> {
        if let Some(current) = &self.accepted {
            if current.same_session(&payload) {
                debug!(room_id = %self.room_id, start_at = payload.start_at, "Duplicate start-game");
                return Ok(StartOutcome::Duplicate);
            }
        }

        store.save_start(&self.room_id, &payload)?;
        let outcome = if self.accepted.is_some() {
            info!(room_id = %self.room_id, start_at = payload.start_at, "New session replaces current one");
            StartOutcome::Restarted(payload.clone())
        } else {
            info!(room_id = %self.room_id, start_at = payload.start_at, "Received session start");
            StartOutcome::Started(payload.clone())
        };
        self.accepted = Some(payload);
        Ok(outcome)
    }

    /// Entering the session view: use a persisted payload if there is one
    pub fn resume(&mut self, store: &dyn SessionStore) -> Result<Option<StartPayload>> {
        let stored = store.load_start(&self.room_id)?;
        if let Some(payload) = &stored {
            info!(room_id = %self.room_id, start_at = payload.start_at, "Resuming from stored start payload");
            self.accepted = Some(payload.clone());
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn room() -> RoomId {
        RoomId::parse("W-7K3P").unwrap()
    }

    fn settings() -> RoomSettings {
        RoomSettings {
            duration_sec: 300,
            theme: "x".into(),
        }
    }

    #[test]
    fn test_host_start_persists() {
        let mut store = MemoryStore::new();
        let mut host = StartCoordinator::new(room(), Role::Host);

        let payload = host.start_session(&settings(), 10_000, &mut store).unwrap();
        assert_eq!(payload.start_at, 13_000);
        assert_eq!(store.load_start(&room()).unwrap(), Some(payload));
    }

    #[test]
    fn test_follower_cannot_start() {
        let mut store = MemoryStore::new();
        let mut follower = StartCoordinator::new(room(), Role::Follower);
        assert!(follower.start_session(&settings(), 0, &mut store).is_err());
        assert!(store.load_start(&room()).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_start_is_absorbed() {
        let mut store = MemoryStore::new();
        let mut follower = StartCoordinator::new(room(), Role::Follower);
        let payload = StartPayload::scheduled(&settings(), 0);

        let first = follower.receive(payload.clone(), &mut store).unwrap();
        assert_eq!(first, StartOutcome::Started(payload.clone()));

        let second = follower.receive(payload, &mut store).unwrap();
        assert_eq!(second, StartOutcome::Duplicate);
    }

    #[test]
    fn test_new_start_at_is_new_session() {
        let mut store = MemoryStore::new();
        let mut follower = StartCoordinator::new(room(), Role::Follower);
        follower
            .receive(StartPayload::scheduled(&settings(), 0), &mut store)
            .unwrap();

        let later = StartPayload::scheduled(&settings(), 60_000);
        let outcome = follower.receive(later.clone(), &mut store).unwrap();
        assert_eq!(outcome, StartOutcome::Restarted(later.clone()));
        assert_eq!(store.load_start(&room()).unwrap(), Some(later));
    }

    #[test]
    fn test_resume_then_echo_is_duplicate() {
        let mut store = MemoryStore::new();
        let payload = StartPayload::scheduled(&settings(), 0);
        store.save_start(&room(), &payload).unwrap();

        let mut follower = StartCoordinator::new(room(), Role::Follower);
        assert_eq!(follower.resume(&store).unwrap(), Some(payload.clone()));
        assert_eq!(
            follower.receive(payload, &mut store).unwrap(),
            StartOutcome::Duplicate
        );
    }

    #[test]
    fn test_resume_without_record() {
        let store = MemoryStore::new();
        let mut follower = StartCoordinator::new(room(), Role::Follower);
        assert!(follower.resume(&store).unwrap().is_none());
        assert!(follower.accepted().is_none());
    }
}
