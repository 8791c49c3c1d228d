//! WordArena Core Library
//!
//! Room codes, presence tracking, host settings, synchronized start and the
//! countdown engine for WordArena writing rooms. Everything here is
//! synchronous; the network and application crates drive it.

pub mod clock;
pub mod error;
pub mod events;
pub mod models;
pub mod presence;
pub mod room_id;
pub mod settings;
pub mod start;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use events::{RoomEvent, ROOM_SETTINGS_EVENT, START_GAME_EVENT};
pub use models::*;
pub use presence::{PresenceChange, PresenceRegistry};
pub use room_id::RoomId;
pub use settings::LobbySettings;
pub use start::{StartCoordinator, StartOutcome};
pub use storage::{MemoryStore, SessionStore, SqliteStore};
pub use timer::{derive_state, format_clock, TimerEngine, TimerPhase, TimerState, TICK_INTERVAL_MS};
