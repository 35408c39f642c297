//! Append-only play event log entry.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Sum type for the event kinds the scrobble state machine derives, per the
/// "sum types for event and error kinds" design note — serialized to a
/// string only at the persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Play,
    Skip,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Play => "play",
            EventKind::Skip => "skip",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "start" => Some(EventKind::Start),
            "play" => Some(EventKind::Play),
            "skip" => Some(EventKind::Skip),
            _ => None,
        }
    }
}

/// Never mutated; retained for diagnostics even after the song it refers to
/// is removed by a differential sync.
#[derive(Debug, Clone)]
pub struct PlayEvent {
    pub user_id: String,
    pub song_id: String,
    pub event_type: EventKind,
    pub timestamp: NaiveDateTime,
    pub previous_song_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for kind in [EventKind::Start, EventKind::Play, EventKind::Skip] {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_str_is_none() {
        assert_eq!(EventKind::from_str("bogus"), None);
    }
}
