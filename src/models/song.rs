//! Song entity, identity `(user_id, id)`.

use chrono::NaiveDateTime;
use serde::Serialize;

/// A song as known to this user's listening model.
///
/// `play_count`/`skip_count` are monotonically non-decreasing; `last_played`/
/// `last_skipped` only move forward. Created or refreshed by the background
/// sync loop, which preserves these counters across refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: i32,
    pub last_played: Option<NaiveDateTime>,
    pub last_skipped: Option<NaiveDateTime>,
    pub play_count: i64,
    pub skip_count: i64,
    pub cover_art_token: Option<String>,
}

impl Song {
    /// The later of `last_played`/`last_skipped`, used by the shuffle
    /// engine's time-decay weight component.
    pub fn last_touched(&self) -> Option<NaiveDateTime> {
        match (self.last_played, self.last_skipped) {
            (Some(p), Some(s)) => Some(p.max(s)),
            (Some(p), None) => Some(p),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }

    /// Eligible for the shuffle iff both `last_played` and `last_skipped`
    /// are absent or strictly before `cutoff`.
    pub fn eligible_at(&self, cutoff: NaiveDateTime) -> bool {
        let played_ok = self.last_played.is_none_or(|t| t < cutoff);
        let skipped_ok = self.last_skipped.is_none_or(|t| t < cutoff);
        played_ok && skipped_ok
    }
}

/// Upstream-sourced song data used by `store_songs` to upsert the library.
/// Counters and timestamps are intentionally absent: upsert preserves
/// whatever the existing row has on conflict.
#[derive(Debug, Clone)]
pub struct UpstreamSong {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: i32,
    pub cover_art_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(days_ago: i64) -> NaiveDateTime {
        chrono::Local::now().naive_local() - chrono::Duration::days(days_ago)
    }

    fn song(last_played: Option<NaiveDateTime>, last_skipped: Option<NaiveDateTime>) -> Song {
        Song {
            id: "s1".into(),
            user_id: "u1".into(),
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            duration_seconds: 200,
            last_played,
            last_skipped,
            play_count: 0,
            skip_count: 0,
            cover_art_token: None,
        }
    }

    #[test]
    fn eligible_when_never_touched() {
        let s = song(None, None);
        let cutoff = dt(14);
        assert!(s.eligible_at(cutoff));
    }

    #[test]
    fn ineligible_within_window() {
        let s = song(Some(dt(1)), None);
        let cutoff = dt(14);
        assert!(!s.eligible_at(cutoff));
    }

    #[test]
    fn eligible_outside_window() {
        let s = song(Some(dt(30)), Some(dt(40)));
        let cutoff = dt(14);
        assert!(s.eligible_at(cutoff));
    }

    #[test]
    fn last_touched_picks_later() {
        let played = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let skipped = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let s = song(Some(played), Some(skipped));
        assert_eq!(s.last_touched(), Some(skipped));
    }
}
