//! Song-to-song transition aggregate, identity `(user_id, from_song_id, to_song_id)`.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::db::schema::song_transitions;
use crate::db::DbPool;
use crate::error::ProxyError;
use crate::models::{EventKind, SongTransition, DEFAULT_TRANSITION_PROBABILITY};

#[derive(Queryable, Debug, Clone)]
struct TransitionRow {
    user_id: String,
    from_song_id: String,
    to_song_id: String,
    play_count: i64,
    skip_count: i64,
}

impl From<TransitionRow> for SongTransition {
    fn from(r: TransitionRow) -> Self {
        SongTransition {
            user_id: r.user_id,
            from_song_id: r.from_song_id,
            to_song_id: r.to_song_id,
            play_count: r.play_count,
            skip_count: r.skip_count,
        }
    }
}

#[derive(Clone)]
pub struct TransitionRepository {
    pool: DbPool,
}

impl TransitionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Records `outcome` for the `from -> to` transition, creating the row
    /// with a zeroed counter pair if it doesn't exist yet. `EventKind::Start`
    /// is a no-op, same as `SongTransition::record`.
    pub fn record(&self, user_id: &str, from_song_id: &str, to_song_id: &str, outcome: EventKind) -> Result<(), ProxyError> {
        if matches!(outcome, EventKind::Start) {
            return Ok(());
        }
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let play_inc = i64::from(matches!(outcome, EventKind::Play));
        let skip_inc = i64::from(matches!(outcome, EventKind::Skip));
        diesel::insert_into(song_transitions::table)
            .values((
                song_transitions::user_id.eq(user_id),
                song_transitions::from_song_id.eq(from_song_id),
                song_transitions::to_song_id.eq(to_song_id),
                song_transitions::play_count.eq(play_inc),
                song_transitions::skip_count.eq(skip_inc),
            ))
            .on_conflict((
                song_transitions::user_id,
                song_transitions::from_song_id,
                song_transitions::to_song_id,
            ))
            .do_update()
            .set((
                song_transitions::play_count.eq(song_transitions::play_count + excluded(song_transitions::play_count)),
                song_transitions::skip_count.eq(song_transitions::skip_count + excluded(song_transitions::skip_count)),
            ))
            .execute(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(())
    }

    pub fn get(&self, user_id: &str, from_song_id: &str, to_song_id: &str) -> Result<Option<SongTransition>, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let row = song_transitions::table
            .filter(song_transitions::user_id.eq(user_id))
            .filter(song_transitions::from_song_id.eq(from_song_id))
            .filter(song_transitions::to_song_id.eq(to_song_id))
            .select((
                song_transitions::user_id,
                song_transitions::from_song_id,
                song_transitions::to_song_id,
                song_transitions::play_count,
                song_transitions::skip_count,
            ))
            .first::<TransitionRow>(&mut conn)
            .optional()
            .map_err(ProxyError::from)?;
        Ok(row.map(SongTransition::from))
    }

    /// Transition affinity weight for the shuffle engine: the recorded
    /// probability, or the neutral default when no history exists.
    pub fn probability(&self, user_id: &str, from_song_id: &str, to_song_id: &str) -> Result<f64, ProxyError> {
        Ok(self
            .get(user_id, from_song_id, to_song_id)?
            .map(|t| t.probability())
            .unwrap_or(DEFAULT_TRANSITION_PROBABILITY))
    }

    /// Batched transition-probability lookup for every id in `to_ids` at
    /// once, so the large-library shuffle path scores a whole reservoir
    /// without one query per candidate. Ids with no recorded transition get
    /// the neutral default.
    pub fn probabilities(
        &self,
        user_id: &str,
        from_song_id: &str,
        to_ids: &[String],
    ) -> Result<HashMap<String, f64>, ProxyError> {
        let mut result: HashMap<String, f64> = to_ids
            .iter()
            .map(|id| (id.clone(), DEFAULT_TRANSITION_PROBABILITY))
            .collect();
        if to_ids.is_empty() {
            return Ok(result);
        }

        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let rows = song_transitions::table
            .filter(song_transitions::user_id.eq(user_id))
            .filter(song_transitions::from_song_id.eq(from_song_id))
            .filter(song_transitions::to_song_id.eq_any(to_ids))
            .select((
                song_transitions::user_id,
                song_transitions::from_song_id,
                song_transitions::to_song_id,
                song_transitions::play_count,
                song_transitions::skip_count,
            ))
            .load::<TransitionRow>(&mut conn)
            .map_err(ProxyError::from)?;

        for row in rows {
            let to_id = row.to_song_id.clone();
            result.insert(to_id, SongTransition::from(row).probability());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::db::connection::{build_pool, run_migrations};

    fn test_repo() -> TransitionRepository {
        let cfg = PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime: std::time::Duration::from_secs(3600),
            max_idle_time: std::time::Duration::from_secs(600),
            health_check: false,
        };
        let pool = build_pool(":memory:", &cfg).expect("pool");
        run_migrations(&pool).expect("migrate");
        TransitionRepository::new(pool)
    }

    #[test]
    fn unseen_transition_defaults_to_neutral() {
        let repo = test_repo();
        assert_eq!(repo.probability("u1", "a", "b").unwrap(), DEFAULT_TRANSITION_PROBABILITY);
    }

    #[test]
    fn record_accumulates_across_calls() {
        let repo = test_repo();
        repo.record("u1", "a", "b", EventKind::Play).unwrap();
        repo.record("u1", "a", "b", EventKind::Play).unwrap();
        repo.record("u1", "a", "b", EventKind::Skip).unwrap();
        let t = repo.get("u1", "a", "b").unwrap().unwrap();
        assert_eq!(t.play_count, 2);
        assert_eq!(t.skip_count, 1);
    }

    #[test]
    fn start_is_a_no_op() {
        let repo = test_repo();
        repo.record("u1", "a", "b", EventKind::Start).unwrap();
        assert!(repo.get("u1", "a", "b").unwrap().is_none());
    }

    #[test]
    fn probabilities_batches_known_and_default_ids() {
        let repo = test_repo();
        repo.record("u1", "a", "b", EventKind::Play).unwrap();
        repo.record("u1", "a", "b", EventKind::Play).unwrap();
        let ids = vec!["b".to_string(), "c".to_string()];
        let probs = repo.probabilities("u1", "a", &ids).unwrap();
        assert_eq!(probs.len(), 2);
        assert_eq!(probs["b"], 1.0);
        assert_eq!(probs["c"], DEFAULT_TRANSITION_PROBABILITY);
    }

    #[test]
    fn probabilities_with_no_ids_returns_empty_map() {
        let repo = test_repo();
        let probs = repo.probabilities("u1", "a", &[]).unwrap();
        assert!(probs.is_empty());
    }
}
