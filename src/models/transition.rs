//! Song-to-song transition, identity `(user_id, from_song_id, to_song_id)`.

use crate::models::EventKind;

/// Default transition probability when no row exists yet.
pub const DEFAULT_TRANSITION_PROBABILITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SongTransition {
    pub user_id: String,
    pub from_song_id: String,
    pub to_song_id: String,
    pub play_count: i64,
    pub skip_count: i64,
}

impl SongTransition {
    pub fn new(user_id: impl Into<String>, from_song_id: impl Into<String>, to_song_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            from_song_id: from_song_id.into(),
            to_song_id: to_song_id.into(),
            play_count: 0,
            skip_count: 0,
        }
    }

    /// `play_count / (play_count + skip_count)`, defaulting to 0.5 when
    /// nothing has been observed yet.
    pub fn probability(&self) -> f64 {
        let total = self.play_count + self.skip_count;
        if total == 0 {
            DEFAULT_TRANSITION_PROBABILITY
        } else {
            self.play_count as f64 / total as f64
        }
    }

    pub fn record(&mut self, outcome: EventKind) {
        match outcome {
            EventKind::Play => self.play_count += 1,
            EventKind::Skip => self.skip_count += 1,
            EventKind::Start => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_probability_is_half() {
        let t = SongTransition::new("u", "a", "b");
        assert_eq!(t.probability(), 0.5);
    }

    #[test]
    fn probability_tracks_ratio() {
        let mut t = SongTransition::new("u", "a", "b");
        t.record(EventKind::Play);
        t.record(EventKind::Play);
        t.record(EventKind::Skip);
        assert!((t.probability() - (2.0 / 3.0)).abs() < 1e-9);
    }
}
