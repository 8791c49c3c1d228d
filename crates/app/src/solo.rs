//! Single-player countdown
//!
//! Same timer engine as a room session, started immediately, with the
//! draft autosaved to a plain file in the data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use wordarena_core::{
    format_clock, Clock, SettingsDraft, StartPayload, SystemClock, TimerEngine, TICK_INTERVAL_MS,
};

use crate::cadence::Cadence;
use crate::error::Result;

pub const SOLO_DRAFT_FILE: &str = "solo-draft.txt";

/// Typed line that empties the draft instead of being appended
pub const CLEAR_COMMAND: &str = "/clear";

pub fn draft_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SOLO_DRAFT_FILE)
}

/// Payload for a solo round starting right now
fn solo_payload(minutes: u32, now_ms: i64) -> StartPayload {
    let settings = SettingsDraft::new(i64::from(minutes), 0, "").validate();
    StartPayload {
        start_at: now_ms,
        duration_sec: settings.duration_sec,
        theme: settings.theme,
    }
}

/// Apply one typed line to the draft
fn edit_draft(draft: &mut String, line: &str) {
    if line.trim() == CLEAR_COMMAND {
        draft.clear();
        return;
    }
    draft.push_str(line.trim_end());
    draft.push('\n');
}

pub async fn run(data_dir: &Path, minutes: u32) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = draft_path(data_dir);
    let mut draft = match std::fs::read_to_string(&path) {
        Ok(saved) => saved,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let clock = SystemClock;
    let mut timer = TimerEngine::new();
    let state = timer.acquire(solo_payload(minutes, clock.now_ms()), clock.now_ms());
    info!(duration_sec = state.seconds_left, "Solo round started");
    println!(
        "Solo round: {}. Type to write, {} to start over, Ctrl-D to stop.",
        format_clock(state.seconds_left),
        CLEAR_COMMAND
    );
    if !draft.is_empty() {
        println!("(restored {} saved lines)", draft.lines().count());
    }

    let mut cadence = Cadence::new(Duration::from_millis(TICK_INTERVAL_MS));
    cadence.start();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_shown = state.seconds_left;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !timer.is_editable() {
                    println!("Time is up. Your text is locked.");
                    continue;
                }
                edit_draft(&mut draft, &line);
                std::fs::write(&path, &draft)?;
            }
            _ = cadence.tick() => {
                let state = timer.tick(clock.now_ms());
                if state.locked {
                    cadence.stop();
                    println!("Time is up. Your text is locked.");
                    break;
                }
                if state.seconds_left != last_shown && (state.seconds_left % 60 == 0 || state.seconds_left <= 10) {
                    println!("[{}]", format_clock(state.seconds_left));
                }
                last_shown = state.seconds_left;
            }
        }
    }

    println!("--- your text ---\n{}", draft);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordarena_core::{derive_state, FREE_THEME};

    #[test]
    fn test_solo_payload_starts_now() {
        let payload = solo_payload(2, 5_000);
        assert_eq!(payload.start_at, 5_000);
        assert_eq!(payload.duration_sec, 120);
        assert_eq!(payload.theme, FREE_THEME);
        assert_eq!(derive_state(&payload, 5_000).seconds_left, 120);
    }

    #[test]
    fn test_clear_empties_draft() {
        let mut draft = String::new();
        edit_draft(&mut draft, "first  ");
        edit_draft(&mut draft, "second");
        assert_eq!(draft, "first\nsecond\n");

        edit_draft(&mut draft, " /clear ");
        assert!(draft.is_empty());

        edit_draft(&mut draft, "again");
        assert_eq!(draft, "again\n");
    }

    #[test]
    fn test_solo_minutes_are_clamped() {
        assert_eq!(solo_payload(1_000, 0).duration_sec, 240 * 60);
    }
}
