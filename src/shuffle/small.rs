//! Exact weighted sampling without replacement for small libraries (the
//! whole eligible set fits comfortably in memory).

use rand::Rng;

use crate::models::Song;

/// Efraimidis-Spirakis weighted sampling: each candidate gets a key
/// `u^(1/weight)` for `u ~ Uniform(0, 1)`; the top `count` keys win. Higher
/// weight pushes the key closer to 1, so it's more likely to be picked.
pub fn select(mut candidates: Vec<(Song, f64)>, count: usize, rng: &mut impl Rng) -> Vec<Song> {
    let mut keyed: Vec<(f64, Song)> = candidates
        .drain(..)
        .map(|(song, weight)| {
            let u: f64 = rng.random_range(f64::MIN_POSITIVE..1.0);
            let key = u.powf(1.0 / weight);
            (key, song)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.truncate(count);
    keyed.into_iter().map(|(_, song)| song).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn song(id: &str) -> Song {
        Song {
            id: id.into(),
            user_id: "u".into(),
            title: id.into(),
            artist: "a".into(),
            album: "al".into(),
            duration_seconds: 200,
            last_played: None,
            last_skipped: None,
            play_count: 0,
            skip_count: 0,
            cover_art_token: None,
        }
    }

    #[test]
    fn never_returns_more_than_requested() {
        let mut rng = SmallRng::seed_from_u64(1);
        let candidates = vec![(song("a"), 1.0), (song("b"), 1.0), (song("c"), 1.0)];
        let picked = select(candidates, 2, &mut rng);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn returns_everything_when_count_exceeds_population() {
        let mut rng = SmallRng::seed_from_u64(2);
        let candidates = vec![(song("a"), 1.0), (song("b"), 1.0)];
        let picked = select(candidates, 10, &mut rng);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn never_duplicates_a_song() {
        let mut rng = SmallRng::seed_from_u64(3);
        let candidates = vec![(song("a"), 1.0), (song("b"), 1.0), (song("c"), 1.0), (song("d"), 1.0)];
        let picked = select(candidates, 3, &mut rng);
        let mut ids: Vec<_> = picked.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
