//! Per-artist aggregate, identity `(user_id, artist)`.

use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::db::schema::artist_stats;
use crate::db::DbPool;
use crate::error::ProxyError;
use crate::models::{ArtistStats, EventKind};

#[derive(Queryable, Debug, Clone)]
struct ArtistStatsRow {
    user_id: String,
    artist: String,
    play_count: i64,
    skip_count: i64,
}

impl From<ArtistStatsRow> for ArtistStats {
    fn from(r: ArtistStatsRow) -> Self {
        ArtistStats {
            user_id: r.user_id,
            artist: r.artist,
            play_count: r.play_count,
            skip_count: r.skip_count,
        }
    }
}

#[derive(Clone)]
pub struct ArtistStatsRepository {
    pool: DbPool,
}

impl ArtistStatsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Records `outcome` against `artist` in the same transaction boundary
    /// as the triggering play event, per the mandate that artist stats
    /// never drift out of sync with the event log.
    pub fn record(&self, user_id: &str, artist: &str, outcome: EventKind) -> Result<(), ProxyError> {
        if matches!(outcome, EventKind::Start) {
            return Ok(());
        }
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let play_inc = i64::from(matches!(outcome, EventKind::Play));
        let skip_inc = i64::from(matches!(outcome, EventKind::Skip));
        diesel::insert_into(artist_stats::table)
            .values((
                artist_stats::user_id.eq(user_id),
                artist_stats::artist.eq(artist),
                artist_stats::play_count.eq(play_inc),
                artist_stats::skip_count.eq(skip_inc),
            ))
            .on_conflict((artist_stats::user_id, artist_stats::artist))
            .do_update()
            .set((
                artist_stats::play_count.eq(artist_stats::play_count + excluded(artist_stats::play_count)),
                artist_stats::skip_count.eq(artist_stats::skip_count + excluded(artist_stats::skip_count)),
            ))
            .execute(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(())
    }

    pub fn get(&self, user_id: &str, artist: &str) -> Result<Option<ArtistStats>, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let row = artist_stats::table
            .filter(artist_stats::user_id.eq(user_id))
            .filter(artist_stats::artist.eq(artist))
            .select((
                artist_stats::user_id,
                artist_stats::artist,
                artist_stats::play_count,
                artist_stats::skip_count,
            ))
            .first::<ArtistStatsRow>(&mut conn)
            .optional()
            .map_err(ProxyError::from)?;
        Ok(row.map(ArtistStats::from))
    }

    pub fn ratio(&self, user_id: &str, artist: &str) -> Result<f64, ProxyError> {
        Ok(self.get(user_id, artist)?.map(|a| a.ratio()).unwrap_or(0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::db::connection::{build_pool, run_migrations};

    fn test_repo() -> ArtistStatsRepository {
        let cfg = PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime: std::time::Duration::from_secs(3600),
            max_idle_time: std::time::Duration::from_secs(600),
            health_check: false,
        };
        let pool = build_pool(":memory:", &cfg).expect("pool");
        run_migrations(&pool).expect("migrate");
        ArtistStatsRepository::new(pool)
    }

    #[test]
    fn unseen_artist_defaults_to_half() {
        let repo = test_repo();
        assert_eq!(repo.ratio("u1", "Radiohead").unwrap(), 0.5);
    }

    #[test]
    fn record_accumulates_across_calls() {
        let repo = test_repo();
        repo.record("u1", "Radiohead", EventKind::Play).unwrap();
        repo.record("u1", "Radiohead", EventKind::Play).unwrap();
        repo.record("u1", "Radiohead", EventKind::Skip).unwrap();
        let stats = repo.get("u1", "Radiohead").unwrap().unwrap();
        assert_eq!(stats.play_count, 2);
        assert_eq!(stats.skip_count, 1);
    }
}
