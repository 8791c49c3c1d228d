//! Countdown derived from absolute wall-clock time
//!
//! Remaining time is recomputed from `(now, start_at, duration)` on every
//! tick instead of decrementing a counter, so missed or late ticks and
//! process restarts never skew it.

use tracing::{debug, info};

use crate::models::StartPayload;

/// Cadence at which a running timer is re-derived
pub const TICK_INTERVAL_MS: u64 = 250;

/// Remaining time for a session at some instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub seconds_left: u32,
    pub locked: bool,
}

impl TimerState {
    fn locked() -> Self {
        Self {
            seconds_left: 0,
            locked: true,
        }
    }
}

/// Pure derivation of the timer state.
///
/// Before `start_at` the full duration remains; at
/// `start_at + duration_sec * 1000` and after, zero remains and the state
/// is locked.
///
/// `start_at` arrives from peers, so any `i64` must be handled without
/// overflow.
pub fn derive_state(payload: &StartPayload, now_ms: i64) -> TimerState {
    if now_ms >= payload.ends_at() {
        return TimerState::locked();
    }
    let elapsed_sec = now_ms.saturating_sub(payload.start_at).max(0) / 1000;
    let elapsed_sec = u32::try_from(elapsed_sec).unwrap_or(u32::MAX);
    let seconds_left = payload.duration_sec.saturating_sub(elapsed_sec);
    TimerState {
        seconds_left,
        locked: seconds_left == 0,
    }
}

/// Format seconds as `MM:SS`
pub fn format_clock(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    WaitingForStart,
    Running,
    Locked,
}

/// Timer state machine for one participant
#[derive(Debug, Clone)]
pub struct TimerEngine {
    phase: TimerPhase,
    payload: Option<StartPayload>,
    state: Option<TimerState>,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerEngine {
    pub fn new() -> Self {
        Self {
            phase: TimerPhase::WaitingForStart,
            payload: None,
            state: None,
        }
    }

    /// Take a start payload and derive the first state right away.
    ///
    /// Re-acquiring the payload already driving the timer changes nothing.
    /// A payload with a different `start_at` starts a fresh session.
    pub fn acquire(&mut self, payload: StartPayload, now_ms: i64) -> TimerState {
        if let (Some(current), Some(state)) = (&self.payload, self.state) {
            if current.same_session(&payload) {
                debug!(start_at = payload.start_at, "Start payload already acquired");
                return state;
            }
        }

        info!(
            start_at = payload.start_at,
            duration_sec = payload.duration_sec,
            "Timer acquired start payload"
        );
        self.payload = Some(payload);
        self.phase = TimerPhase::Running;
        self.state = None;
        self.tick(now_ms)
    }

    /// Re-derive the state. No effect while waiting; frozen once locked.
    pub fn tick(&mut self, now_ms: i64) -> TimerState {
        match self.phase {
            TimerPhase::WaitingForStart => TimerState {
                seconds_left: 0,
                locked: false,
            },
            TimerPhase::Locked => TimerState::locked(),
            TimerPhase::Running => {
                let Some(payload) = &self.payload else {
                    return TimerState::locked();
                };
                let state = derive_state(payload, now_ms);
                if state.locked {
                    info!(start_at = payload.start_at, "Timer reached zero, session locked");
                    self.phase = TimerPhase::Locked;
                }
                self.state = Some(state);
                state
            }
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn payload(&self) -> Option<&StartPayload> {
        self.payload.as_ref()
    }

    /// Last derived state, if any payload has been acquired
    pub fn state(&self) -> Option<TimerState> {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn is_locked(&self) -> bool {
        self.phase == TimerPhase::Locked
    }

    /// Writing is only allowed while the countdown runs
    pub fn is_editable(&self) -> bool {
        self.phase == TimerPhase::Running
    }
}
