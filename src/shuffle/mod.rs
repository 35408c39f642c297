//! Weighted-shuffle engine: combines time-decay, Bayesian play/skip
//! posterior, transition affinity and artist affinity into one selection
//! weight per eligible song, then samples without replacement.

mod large;
mod small;
mod weights;

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;

use crate::db::{ArtistStatsRepository, SongRepository, TransitionRepository};
use crate::error::ProxyError;
use crate::models::Song;

pub use weights::EmpiricalPriors;

/// Songs within this window of their last play/skip are excluded from the
/// shuffle entirely.
pub const NO_REPLAY_WINDOW: Duration = Duration::from_secs(14 * 24 * 3600);

/// Above this many eligible songs, the engine switches from exact scoring
/// to streaming reservoir sampling.
const LARGE_LIBRARY_THRESHOLD: i64 = 5000;

/// Page size when paging through eligible songs for the large-library
/// reservoir, so a single sync never materializes the whole table.
const ELIGIBLE_PAGE_SIZE: i64 = 1000;

/// How much the large-library reservoir oversamples relative to the final
/// selection size, so the weighted pass afterward has real options.
const RESERVOIR_OVERSAMPLE: usize = 3;

struct CachedPriors {
    totals: (i64, i64, i64),
    priors: EmpiricalPriors,
}

pub struct ShuffleEngine {
    songs: SongRepository,
    transitions: TransitionRepository,
    artists: ArtistStatsRepository,
    last_played: RwLock<HashMap<String, String>>,
    prior_cache: RwLock<HashMap<String, CachedPriors>>,
    rng: Mutex<StdRng>,
}

impl ShuffleEngine {
    /// `rng` is threaded in explicitly, rather than seeded internally from
    /// OS entropy, so both selection variants are deterministic with
    /// respect to whatever seed the caller provides.
    pub fn new(
        songs: SongRepository,
        transitions: TransitionRepository,
        artists: ArtistStatsRepository,
        rng: StdRng,
    ) -> Self {
        Self {
            songs,
            transitions,
            artists,
            last_played: RwLock::new(HashMap::new()),
            prior_cache: RwLock::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Called whenever a song starts playing, so the transition-affinity
    /// weight component has a "from" song to work with.
    pub fn note_started(&self, user_id: &str, song_id: &str) {
        self.last_played.write().insert(user_id.to_string(), song_id.to_string());
    }

    fn priors_for(&self, user_id: &str) -> Result<EmpiricalPriors, ProxyError> {
        let totals = self.songs.user_totals(user_id)?;
        if let Some(cached) = self.prior_cache.read().get(user_id) {
            if cached.totals == totals {
                return Ok(cached.priors);
            }
        }
        let priors = EmpiricalPriors::from_totals(totals.0, totals.1, totals.2);
        self.prior_cache.write().insert(user_id.to_string(), CachedPriors { totals, priors });
        Ok(priors)
    }

    /// Combines all four weight components for `song`, given an
    /// already-resolved transition probability: a single lookup for the
    /// small-library path, a batched one for the large-library path.
    fn score(
        &self,
        user_id: &str,
        song: &Song,
        priors: EmpiricalPriors,
        now: NaiveDateTime,
        transition_probability: f64,
    ) -> Result<f64, ProxyError> {
        let time = weights::time_decay_weight(song, now);
        let quality = weights::quality_weight(song, priors);
        let transition = weights::transition_weight(transition_probability);
        let artist_stats = self.artists.get(user_id, &song.artist)?;
        let (artist_plays, artist_skips) = artist_stats.map(|a| (a.play_count, a.skip_count)).unwrap_or((0, 0));
        let artist = weights::artist_weight(artist_plays, artist_skips, priors);
        Ok(weights::combined_weight(time, quality, transition, artist))
    }

    fn weight_for(&self, user_id: &str, song: &Song, priors: EmpiricalPriors, now: NaiveDateTime) -> Result<f64, ProxyError> {
        let transition_probability = match self.last_played.read().get(user_id) {
            Some(prev) if prev != &song.id => self.transitions.probability(user_id, prev, &song.id)?,
            _ => crate::models::DEFAULT_TRANSITION_PROBABILITY,
        };
        self.score(user_id, song, priors, now, transition_probability)
    }

    /// Picks up to `count` songs for `user_id`, never replaying anything
    /// touched within the no-replay window. May return fewer than `count`
    /// when the eligible pool is smaller than requested.
    pub fn pick_random(&self, user_id: &str, count: usize, now: NaiveDateTime) -> Result<Vec<Song>, ProxyError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let cutoff = now - chrono::Duration::from_std(NO_REPLAY_WINDOW).unwrap_or_else(|_| chrono::Duration::days(14));
        let priors = self.priors_for(user_id)?;
        let library_size = self.songs.count(user_id)?;

        if library_size <= LARGE_LIBRARY_THRESHOLD {
            let eligible = self.songs.eligible(user_id, cutoff)?;
            let mut weighted = Vec::with_capacity(eligible.len());
            for song in eligible {
                let w = self.weight_for(user_id, &song, priors, now)?;
                weighted.push((song, w));
            }
            let mut rng = self.rng.lock();
            Ok(small::select(weighted, count, &mut *rng))
        } else {
            self.pick_random_large(user_id, count, cutoff, priors, now)
        }
    }

    /// Large-library path: size a reservoir at `count * 3` (capped to the
    /// eligible total), fill it via uniform reservoir sampling while paging
    /// through eligible songs, fetch every reservoir candidate's transition
    /// probability in one batched query, then weight and select from the
    /// reservoir exactly as the small-library path does.
    fn pick_random_large(
        &self,
        user_id: &str,
        count: usize,
        cutoff: NaiveDateTime,
        priors: EmpiricalPriors,
        now: NaiveDateTime,
    ) -> Result<Vec<Song>, ProxyError> {
        let eligible_total = self.songs.eligible_count(user_id, cutoff)?;
        if eligible_total <= 0 {
            return Ok(Vec::new());
        }
        let reservoir_size = (count * RESERVOIR_OVERSAMPLE).min(eligible_total as usize);

        let mut rng = self.rng.lock();
        let mut reservoir = large::UniformReservoir::new(reservoir_size);
        let mut offset = 0i64;
        loop {
            let page = self.songs.eligible_page(user_id, cutoff, ELIGIBLE_PAGE_SIZE, offset)?;
            let page_len = page.len() as i64;
            for song in page {
                reservoir.offer(song, &mut *rng);
            }
            if page_len < ELIGIBLE_PAGE_SIZE {
                break;
            }
            offset += ELIGIBLE_PAGE_SIZE;
        }
        let candidates = reservoir.into_songs();

        let last_played = self.last_played.read().get(user_id).cloned();
        let to_ids: Vec<String> = candidates.iter().map(|s| s.id.clone()).collect();
        let transition_probs = match &last_played {
            Some(from) => self.transitions.probabilities(user_id, from, &to_ids)?,
            None => HashMap::new(),
        };

        let mut weighted = Vec::with_capacity(candidates.len());
        for song in candidates {
            let transition_probability = match &last_played {
                Some(prev) if prev != &song.id => *transition_probs
                    .get(&song.id)
                    .unwrap_or(&crate::models::DEFAULT_TRANSITION_PROBABILITY),
                _ => crate::models::DEFAULT_TRANSITION_PROBABILITY,
            };
            let w = self.score(user_id, &song, priors, now, transition_probability)?;
            weighted.push((song, w));
        }
        Ok(small::select(weighted, count, &mut *rng))
    }
}
