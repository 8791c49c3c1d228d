//! Synchronized session start record

use serde::{Deserialize, Serialize};

use super::RoomSettings;

/// Delay between the host's start decision and the shared start instant.
///
/// Absorbs one-way delivery latency so followers never derive a start
/// that is already in the past.
pub const SKEW_BUFFER_MS: i64 = 3000;

/// Immutable description of one timed session, carried by `start-game`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    /// Absolute start instant in epoch milliseconds
    pub start_at: i64,
    pub duration_sec: u32,
    pub theme: String,
}

impl StartPayload {
    /// Schedule a session starting one skew buffer after `now_ms`
    pub fn scheduled(settings: &RoomSettings, now_ms: i64) -> Self {
        Self {
            start_at: now_ms.saturating_add(SKEW_BUFFER_MS),
            duration_sec: settings.duration_sec,
            theme: settings.theme.clone(),
        }
    }

    /// Instant at which the countdown reaches zero
    pub fn ends_at(&self) -> i64 {
        self.start_at
            .saturating_add(i64::from(self.duration_sec).saturating_mul(1000))
    }

    /// Whether two payloads describe the same session instance
    pub fn same_session(&self, other: &StartPayload) -> bool {
        self.start_at == other.start_at
    }
}
