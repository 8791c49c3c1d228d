//! Line-based terminal front end
//!
//! Turns typed lines into session commands and session events into
//! printable status lines.

use wordarena_core::{format_clock, Member, SettingsDraft};

use crate::session::{SessionCommand, SessionEvent};

pub const HELP: &str = "\
Commands:
  /settings <min> <sec> [theme...]   host: publish duration and theme
  /start                             host: start the session for everyone
  /members                           list who is in the room
  /quit                              leave the room
Any other line is added to your text while the timer runs.";

/// Parse one typed line.
///
/// Blank lines yield `Ok(None)`. Unknown slash commands and bad arguments
/// yield an error message to print.
pub fn parse_line(line: &str) -> Result<Option<SessionCommand>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !trimmed.starts_with('/') {
        return Ok(Some(SessionCommand::Write(line.trim_end().to_string())));
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or_default();
    match command {
        "/settings" => {
            let usage = || "Usage: /settings <min> <sec> [theme...]".to_string();
            let minutes = parts.next().and_then(|v| v.parse::<i64>().ok()).ok_or_else(usage)?;
            let seconds = parts.next().and_then(|v| v.parse::<i64>().ok()).ok_or_else(usage)?;
            let theme = parts.collect::<Vec<_>>().join(" ");
            Ok(Some(SessionCommand::PublishSettings(SettingsDraft::new(
                minutes, seconds, theme,
            ))))
        }
        "/start" => Ok(Some(SessionCommand::StartGame)),
        "/members" => Ok(Some(SessionCommand::ListMembers)),
        "/quit" | "/leave" => Ok(Some(SessionCommand::Leave)),
        "/help" => Err(HELP.to_string()),
        other => Err(format!("Unknown command {} (try /help)", other)),
    }
}

fn member_list(members: &[Member]) -> String {
    members
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text to print for an event, if any
pub fn render(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::Joined(members) => {
            format!("Joined. In the room ({}): {}", members.len(), member_list(members))
        }
        SessionEvent::JoinFailed(reason) => format!("Could not join: {}", reason),
        SessionEvent::MemberJoined(member) => format!("+ {} joined", member.name),
        SessionEvent::MemberLeft(member) => format!("- {} left", member.name),
        SessionEvent::Members(members) => {
            format!("In the room ({}): {}", members.len(), member_list(members))
        }
        SessionEvent::SettingsChanged(settings) => format!(
            "Settings: {} | theme: {}",
            format_clock(settings.duration_sec),
            settings.theme
        ),
        SessionEvent::SessionStarted { payload, state } => format!(
            "Session started. Theme: {} | {} left{}",
            payload.theme,
            format_clock(state.seconds_left),
            if state.locked { " (finished)" } else { "" }
        ),
        SessionEvent::Tick(state) => {
            // Every ten seconds, then each of the last ten
            if state.seconds_left % 10 != 0 && state.seconds_left > 10 {
                return None;
            }
            format!("[{}]", format_clock(state.seconds_left))
        }
        SessionEvent::Locked => "Time is up. Your text is locked.".to_string(),
        SessionEvent::Status(message) => message.clone(),
        SessionEvent::Disconnected => "Disconnected from relay.".to_string(),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordarena_core::{RoomSettings, TimerState};

    #[test]
    fn test_parse_settings() {
        match parse_line("/settings 2 30 Deep sea").unwrap() {
            Some(SessionCommand::PublishSettings(draft)) => {
                assert_eq!(draft, SettingsDraft::new(2, 30, "Deep sea"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_line("/settings two 30").is_err());
        assert!(parse_line("/settings 2").is_err());
    }

    #[test]
    fn test_parse_plain_text_and_commands() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(
            parse_line("Once upon a time  ").unwrap(),
            Some(SessionCommand::Write("Once upon a time".into()))
        );
        assert_eq!(parse_line("/start").unwrap(), Some(SessionCommand::StartGame));
        assert_eq!(parse_line("/quit").unwrap(), Some(SessionCommand::Leave));
        assert!(parse_line("/dance").is_err());
    }

    #[test]
    fn test_render() {
        let settings = RoomSettings {
            duration_sec: 90,
            theme: "Seas".into(),
        };
        assert_eq!(
            render(&SessionEvent::SettingsChanged(settings)).unwrap(),
            "Settings: 01:30 | theme: Seas"
        );

        let tick = |seconds_left| SessionEvent::Tick(TimerState {
            seconds_left,
            locked: false,
        });
        assert_eq!(render(&tick(3)).unwrap(), "[00:03]");
        assert_eq!(render(&tick(60)).unwrap(), "[01:00]");
        assert!(render(&tick(61)).is_none());
    }

    #[test]
    fn test_render_join_failed() {
        let event = SessionEvent::JoinFailed("Authorization failed: bad signature".into());
        assert_eq!(
            render(&event).unwrap(),
            "Could not join: Authorization failed: bad signature"
        );
    }
}
