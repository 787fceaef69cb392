use serde::{Deserialize, Serialize};

use super::status::{CurrentSnapshot, Status};

/// Which playback transition produced a status broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Play,
    Pause,
    ChangeSeek,
    ChangeRate,
}

/// Messages fanned out by the hub to connected clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ChatMessage {
        sender: String,
        message: String,
        time: i64,
    },

    /// Shared playback clock changed
    Status {
        kind: StatusKind,
        /// Absent when the change did not come from a connected client
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        status: Status,
    },

    /// Reply to a seek check: the client is ahead of the room clock
    TooFast { status: Status },

    /// Reply to a seek check: the client is behind the room clock
    TooSlow { status: Status },

    ChangeCurrent { current: CurrentSnapshot },

    /// Playlist edited; clients refetch it
    ChangeMovies,

    /// Number of connected clients changed
    ChangePeople { people: i64 },

    Error { message: String },
}

impl Message {
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat_message",
            Self::Status { .. } => "status",
            Self::TooFast { .. } => "too_fast",
            Self::TooSlow { .. } => "too_slow",
            Self::ChangeCurrent { .. } => "change_current",
            Self::ChangeMovies => "change_movies",
            Self::ChangePeople { .. } => "change_people",
            Self::Error { .. } => "error",
        }
    }
}

/// Playback position as observed by a client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReport {
    pub seek: f64,
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default)]
    pub time_diff: f64,
}

const fn default_rate() -> f64 {
    1.0
}

/// Frames a client may send to its room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    Chat { message: String },
    Play(PlaybackReport),
    Pause(PlaybackReport),
    ChangeSeek(PlaybackReport),
    ChangeRate(PlaybackReport),
    /// Ask whether the local position is still in sync
    CheckSeek(PlaybackReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tagging() {
        let msg = Message::ChangePeople { people: 3 };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"change_people","people":3}"#);
        assert_eq!(msg.event_type(), "change_people");

        let json = serde_json::to_string(&Message::ChangeMovies).unwrap();
        assert_eq!(json, r#"{"type":"change_movies"}"#);
    }

    #[test]
    fn test_client_action_parsing() {
        let action: ClientAction =
            serde_json::from_str(r#"{"type":"play","seek":12.5,"rate":1.5,"time_diff":0.2}"#)
                .unwrap();
        assert_eq!(
            action,
            ClientAction::Play(PlaybackReport {
                seek: 12.5,
                rate: 1.5,
                time_diff: 0.2
            })
        );

        let action: ClientAction =
            serde_json::from_str(r#"{"type":"check_seek","seek":3.0}"#).unwrap();
        assert_eq!(
            action,
            ClientAction::CheckSeek(PlaybackReport {
                seek: 3.0,
                rate: 1.0,
                time_diff: 0.0
            })
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(serde_json::from_str::<ClientAction>(r#"{"type":"reboot"}"#).is_err());
    }
}
