//! Scrobble state machine: tracks each user's current now-playing song in
//! memory and turns Subsonic `scrobble` calls into persisted play/skip
//! history, inferring skips implicitly when a song is superseded before it
//! had a chance to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::RwLock;

use crate::db::{ArtistStatsRepository, PlayEventRepository, SongRepository, TransitionRepository};
use crate::error::ProxyError;
use crate::models::{EventKind, PlayEvent};

/// Outcome of a scrobble call: whether anything was persisted, and if so
/// which kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrobbleOutcome {
    NoRecord,
    Record { event: EventKind },
}

#[derive(Debug, Clone)]
struct NowPlaying {
    song_id: String,
    artist: String,
    started_at: NaiveDateTime,
    duration_seconds: i32,
    last_submission: Option<NaiveDateTime>,
}

pub struct ScrobbleTracker {
    songs: SongRepository,
    events: PlayEventRepository,
    transitions: TransitionRepository,
    artists: ArtistStatsRepository,
    state: Arc<RwLock<HashMap<String, NowPlaying>>>,
    duration_unknown_fallback: Duration,
}

/// Skip if the superseding/submitting event arrives sooner than this window
/// after the song started; play otherwise. `2 * duration` when known, a
/// fixed fallback when not (a song with unknown length can't be judged
/// against its own runtime).
fn outcome_threshold(duration_seconds: i32, fallback: Duration) -> chrono::Duration {
    if duration_seconds > 0 {
        chrono::Duration::seconds(i64::from(duration_seconds) * 2)
    } else {
        chrono::Duration::from_std(fallback).unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

fn classify(elapsed: chrono::Duration, threshold: chrono::Duration) -> EventKind {
    if elapsed < threshold {
        EventKind::Skip
    } else {
        EventKind::Play
    }
}

impl ScrobbleTracker {
    pub fn new(
        songs: SongRepository,
        events: PlayEventRepository,
        transitions: TransitionRepository,
        artists: ArtistStatsRepository,
        duration_unknown_fallback: Duration,
    ) -> Self {
        Self {
            songs,
            events,
            transitions,
            artists,
            state: Arc::new(RwLock::new(HashMap::new())),
            duration_unknown_fallback,
        }
    }

    /// Reports that `song_id` started playing for `user_id` (Subsonic
    /// `scrobble` with `submission=false`). If a different song was
    /// previously tracked as now-playing, its outcome is inferred and
    /// persisted here, in the same call.
    pub fn now_playing(
        &self,
        user_id: &str,
        song_id: &str,
        artist: &str,
        duration_seconds: i32,
        at: NaiveDateTime,
    ) -> Result<ScrobbleOutcome, ProxyError> {
        let previous = {
            let mut state = self.state.write();
            state.insert(
                user_id.to_string(),
                NowPlaying {
                    song_id: song_id.to_string(),
                    artist: artist.to_string(),
                    started_at: at,
                    duration_seconds,
                    last_submission: None,
                },
            )
        };

        if let Some(prev) = previous {
            if prev.song_id != song_id {
                let elapsed = at - prev.started_at;
                let threshold = outcome_threshold(prev.duration_seconds, self.duration_unknown_fallback);
                let outcome = classify(elapsed, threshold);
                self.persist_outcome(user_id, &prev.song_id, &prev.artist, outcome, at)?;
                self.transitions.record(user_id, &prev.song_id, song_id, outcome)?;
            }
        }

        self.events.insert(&PlayEvent {
            user_id: user_id.to_string(),
            song_id: song_id.to_string(),
            event_type: EventKind::Start,
            timestamp: at,
            previous_song_id: None,
        })?;

        Ok(ScrobbleOutcome::Record { event: EventKind::Start })
    }

    /// Reports an explicit scrobble submission (`submission=true`). Judged
    /// against the same now-playing window as the implicit case; a
    /// submission repeating an already-recorded timestamp for the same song
    /// is ignored.
    pub fn submit(&self, user_id: &str, song_id: &str, at: NaiveDateTime) -> Result<ScrobbleOutcome, ProxyError> {
        let tracked = {
            let mut state = self.state.write();
            match state.get_mut(user_id) {
                Some(np) if np.song_id == song_id => {
                    if np.last_submission == Some(at) {
                        return Ok(ScrobbleOutcome::NoRecord);
                    }
                    np.last_submission = Some(at);
                    Some((np.artist.clone(), np.started_at, np.duration_seconds))
                }
                _ => None,
            }
        };

        let outcome = match tracked {
            Some((artist, started_at, duration_seconds)) => {
                let elapsed = at - started_at;
                let threshold = outcome_threshold(duration_seconds, self.duration_unknown_fallback);
                let outcome = classify(elapsed, threshold);
                self.persist_outcome(user_id, song_id, &artist, outcome, at)?;
                outcome
            }
            None => {
                // No preceding now-playing notification to judge against;
                // take the submission at face value.
                self.songs.record_play(user_id, song_id, at)?;
                self.events.insert(&PlayEvent {
                    user_id: user_id.to_string(),
                    song_id: song_id.to_string(),
                    event_type: EventKind::Play,
                    timestamp: at,
                    previous_song_id: None,
                })?;
                EventKind::Play
            }
        };

        Ok(ScrobbleOutcome::Record { event: outcome })
    }

    fn persist_outcome(
        &self,
        user_id: &str,
        song_id: &str,
        artist: &str,
        outcome: EventKind,
        at: NaiveDateTime,
    ) -> Result<(), ProxyError> {
        match outcome {
            EventKind::Play => self.songs.record_play(user_id, song_id, at)?,
            EventKind::Skip => self.songs.record_skip(user_id, song_id, at)?,
            EventKind::Start => {}
        }
        self.artists.record(user_id, artist, outcome)?;
        self.events.insert(&PlayEvent {
            user_id: user_id.to_string(),
            song_id: song_id.to_string(),
            event_type: outcome,
            timestamp: at,
            previous_song_id: None,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::db::connection::{build_pool, run_migrations};
    use crate::models::UpstreamSong;

    fn tracker() -> ScrobbleTracker {
        let cfg = PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime: Duration::from_secs(3600),
            max_idle_time: Duration::from_secs(600),
            health_check: false,
        };
        let pool = build_pool(":memory:", &cfg).expect("pool");
        run_migrations(&pool).expect("migrate");
        let songs = SongRepository::new(pool.clone());
        songs
            .upsert_songs(
                "u1",
                &[
                    UpstreamSong {
                        id: "a".into(),
                        title: "A".into(),
                        artist: "Artist A".into(),
                        album: "Al".into(),
                        duration_seconds: 100,
                        cover_art_token: None,
                    },
                    UpstreamSong {
                        id: "b".into(),
                        title: "B".into(),
                        artist: "Artist B".into(),
                        album: "Al".into(),
                        duration_seconds: 100,
                        cover_art_token: None,
                    },
                ],
            )
            .unwrap();
        ScrobbleTracker::new(
            songs,
            PlayEventRepository::new(pool.clone()),
            TransitionRepository::new(pool.clone()),
            ArtistStatsRepository::new(pool),
            Duration::from_secs(3600),
        )
    }

    fn at(secs: i64) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(secs)
    }

    #[test]
    fn now_playing_records_a_start_event() {
        let tracker = tracker();
        let outcome = tracker.now_playing("u1", "a", "Artist A", 100, at(0)).unwrap();
        assert_eq!(outcome, ScrobbleOutcome::Record { event: EventKind::Start });
    }

    #[test]
    fn quick_supersede_is_classified_as_skip() {
        let tracker = tracker();
        tracker.now_playing("u1", "a", "Artist A", 100, at(0)).unwrap();
        tracker.now_playing("u1", "b", "Artist B", 100, at(5)).unwrap();
        let song = tracker.songs.get("u1", "a").unwrap().unwrap();
        assert_eq!(song.skip_count, 1);
        assert_eq!(song.play_count, 0);
    }

    #[test]
    fn supersede_past_threshold_is_classified_as_play() {
        let tracker = tracker();
        tracker.now_playing("u1", "a", "Artist A", 100, at(0)).unwrap();
        tracker.now_playing("u1", "b", "Artist B", 100, at(250)).unwrap();
        let song = tracker.songs.get("u1", "a").unwrap().unwrap();
        assert_eq!(song.play_count, 1);
        assert_eq!(song.skip_count, 0);
    }

    #[test]
    fn explicit_submit_follows_the_same_threshold() {
        let tracker = tracker();
        tracker.now_playing("u1", "a", "Artist A", 100, at(0)).unwrap();
        let outcome = tracker.submit("u1", "a", at(10)).unwrap();
        assert_eq!(outcome, ScrobbleOutcome::Record { event: EventKind::Skip });
    }

    #[test]
    fn duplicate_submission_is_ignored() {
        let tracker = tracker();
        tracker.now_playing("u1", "a", "Artist A", 100, at(0)).unwrap();
        tracker.submit("u1", "a", at(250)).unwrap();
        let second = tracker.submit("u1", "a", at(250)).unwrap();
        assert_eq!(second, ScrobbleOutcome::NoRecord);
        let song = tracker.songs.get("u1", "a").unwrap().unwrap();
        assert_eq!(song.play_count, 1);
    }
}
