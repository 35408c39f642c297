//! The four multiplicative weight components that score a candidate song.

use chrono::NaiveDateTime;

use crate::models::Song;

/// Floor under any single weight component so no eligible song is ever
/// assigned a literal zero selection probability.
const MIN_COMPONENT_WEIGHT: f64 = 1e-6;

/// Below this age, in days, time-decay ramps linearly from 0.1 to 1.0; at or
/// above it, the song is past its recency window and gets a flatter boost.
const RECENT_DECAY_CUTOFF_DAYS: f64 = 30.0;

/// A song older than this many days gets the maximum "long untouched" boost.
const MAX_DECAY_DAYS: f64 = 365.0;

/// Empirical-Bayes prior for a user's play/skip posterior, derived from
/// their aggregate plays-per-song and skips-per-song, each floored at 1.0 so
/// a brand-new user's prior never degenerates to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmpiricalPriors {
    pub alpha: f64,
    pub beta: f64,
}

impl EmpiricalPriors {
    pub fn from_totals(total_plays: i64, total_skips: i64, total_songs: i64) -> Self {
        let songs = total_songs.max(1) as f64;
        EmpiricalPriors {
            alpha: (total_plays as f64 / songs).max(1.0),
            beta: (total_skips as f64 / songs).max(1.0),
        }
    }

    fn posterior(&self, plays: i64, skips: i64) -> f64 {
        let plays = plays as f64;
        let skips = skips as f64;
        (plays + self.alpha) / (plays + skips + self.alpha + self.beta)
    }
}

/// Favors songs that have gone longest without being touched. A song that
/// has never been played or skipped gets the maximum boost, since it hasn't
/// even entered the recency curve yet.
pub fn time_decay_weight(song: &Song, now: NaiveDateTime) -> f64 {
    let Some(t) = song.last_touched() else {
        return 4.0;
    };
    let days_since = ((now - t).num_seconds() as f64 / 86_400.0).max(0.0);
    if days_since < RECENT_DECAY_CUTOFF_DAYS {
        0.1 + (days_since / RECENT_DECAY_CUTOFF_DAYS) * 0.9
    } else {
        1.0 + (days_since / MAX_DECAY_DAYS).min(1.0)
    }
}

/// Beta-posterior mean of "this song gets played rather than skipped",
/// regularized by `priors` for songs with little individual history, mapped
/// into the weight range. A song with no play/skip history yet gets a mild,
/// fixed boost rather than the raw prior mean.
pub fn quality_weight(song: &Song, priors: EmpiricalPriors) -> f64 {
    if song.play_count == 0 && song.skip_count == 0 {
        return 1.5;
    }
    let posterior = priors.posterior(song.play_count, song.skip_count);
    (0.2 + posterior * 1.6).max(MIN_COMPONENT_WEIGHT)
}

/// Transition affinity from the last-played song to this candidate. Callers
/// pass the neutral default probability when there is no last-played song,
/// which maps to the neutral weight below.
pub fn transition_weight(probability: f64) -> f64 {
    (0.5 + probability).max(MIN_COMPONENT_WEIGHT)
}

/// Artist-level play/skip affinity, regularized the same way as the
/// song-level quality weight. An artist with no recorded events yet gets
/// the neutral weight rather than the raw prior mean.
pub fn artist_weight(play_count: i64, skip_count: i64, priors: EmpiricalPriors) -> f64 {
    if play_count == 0 && skip_count == 0 {
        return 1.0;
    }
    let posterior = priors.posterior(play_count, skip_count);
    (0.5 + posterior).max(MIN_COMPONENT_WEIGHT)
}

pub fn combined_weight(time: f64, quality: f64, transition: f64, artist: f64) -> f64 {
    (time * quality * transition * artist).max(MIN_COMPONENT_WEIGHT)
}
