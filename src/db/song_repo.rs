//! Song repository: upsert-preserving-counters sync, eligibility queries and
//! play/skip bookkeeping.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::db::schema::songs;
use crate::db::DbPool;
use crate::error::ProxyError;
use crate::models::{Song, UpstreamSong};

#[derive(Queryable, Debug, Clone)]
struct SongRow {
    id: String,
    user_id: String,
    title: String,
    artist: String,
    album: String,
    duration_seconds: i32,
    last_played: Option<NaiveDateTime>,
    last_skipped: Option<NaiveDateTime>,
    play_count: i64,
    skip_count: i64,
    cover_art_token: Option<String>,
}

impl From<SongRow> for Song {
    fn from(r: SongRow) -> Self {
        Song {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            artist: r.artist,
            album: r.album,
            duration_seconds: r.duration_seconds,
            last_played: r.last_played,
            last_skipped: r.last_skipped,
            play_count: r.play_count,
            skip_count: r.skip_count,
            cover_art_token: r.cover_art_token,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = songs)]
struct NewSong<'a> {
    id: &'a str,
    user_id: &'a str,
    title: &'a str,
    artist: &'a str,
    album: &'a str,
    duration_seconds: i32,
    cover_art_token: Option<&'a str>,
}

#[derive(Clone)]
pub struct SongRepository {
    pool: DbPool,
}

impl SongRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts every song in `batch`. New rows start with zeroed counters;
    /// existing rows keep their counters and only their descriptive fields
    /// are refreshed, so a differential sync never loses listening history.
    pub fn upsert_songs(&self, user_id: &str, batch: &[UpstreamSong]) -> Result<(), ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        conn.transaction(|conn| {
            for song in batch {
                let new_row = NewSong {
                    id: &song.id,
                    user_id,
                    title: &song.title,
                    artist: &song.artist,
                    album: &song.album,
                    duration_seconds: song.duration_seconds,
                    cover_art_token: song.cover_art_token.as_deref(),
                };
                diesel::insert_into(songs::table)
                    .values(&new_row)
                    .on_conflict((songs::user_id, songs::id))
                    .do_update()
                    .set((
                        songs::title.eq(excluded(songs::title)),
                        songs::artist.eq(excluded(songs::artist)),
                        songs::album.eq(excluded(songs::album)),
                        songs::duration_seconds.eq(excluded(songs::duration_seconds)),
                        songs::cover_art_token.eq(excluded(songs::cover_art_token)),
                    ))
                    .execute(conn)?;
            }
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(ProxyError::from)
    }

    /// Removes songs no longer present upstream. `play_events` rows
    /// referencing them are left untouched for diagnostics.
    pub fn prune_missing(&self, user_id: &str, current_ids: &[String]) -> Result<usize, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let deleted = diesel::delete(
            songs::table
                .filter(songs::user_id.eq(user_id))
                .filter(songs::id.ne_all(current_ids)),
        )
        .execute(&mut conn)
        .map_err(ProxyError::from)?;
        Ok(deleted)
    }

    pub fn get(&self, user_id: &str, song_id: &str) -> Result<Option<Song>, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let row = songs::table
            .filter(songs::user_id.eq(user_id))
            .filter(songs::id.eq(song_id))
            .select((
                songs::id,
                songs::user_id,
                songs::title,
                songs::artist,
                songs::album,
                songs::duration_seconds,
                songs::last_played,
                songs::last_skipped,
                songs::play_count,
                songs::skip_count,
                songs::cover_art_token,
            ))
            .first::<SongRow>(&mut conn)
            .optional()
            .map_err(ProxyError::from)?;
        Ok(row.map(Song::from))
    }

    pub fn count(&self, user_id: &str) -> Result<i64, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        songs::table
            .filter(songs::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .map_err(ProxyError::from)
    }

    /// All songs untouched since `cutoff`, used by the small-library shuffle
    /// path which scores the full eligible set in memory.
    pub fn eligible(&self, user_id: &str, cutoff: NaiveDateTime) -> Result<Vec<Song>, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let rows = songs::table
            .filter(songs::user_id.eq(user_id))
            .filter(
                songs::last_played
                    .is_null()
                    .or(songs::last_played.lt(cutoff)),
            )
            .filter(
                songs::last_skipped
                    .is_null()
                    .or(songs::last_skipped.lt(cutoff)),
            )
            .select((
                songs::id,
                songs::user_id,
                songs::title,
                songs::artist,
                songs::album,
                songs::duration_seconds,
                songs::last_played,
                songs::last_skipped,
                songs::play_count,
                songs::skip_count,
                songs::cover_art_token,
            ))
            .load::<SongRow>(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(rows.into_iter().map(Song::from).collect())
    }

    /// Count of eligible songs, used by the large-library shuffle path to
    /// size its reservoir before paging through candidates.
    pub fn eligible_count(&self, user_id: &str, cutoff: NaiveDateTime) -> Result<i64, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        songs::table
            .filter(songs::user_id.eq(user_id))
            .filter(songs::last_played.is_null().or(songs::last_played.lt(cutoff)))
            .filter(songs::last_skipped.is_null().or(songs::last_skipped.lt(cutoff)))
            .count()
            .get_result(&mut conn)
            .map_err(ProxyError::from)
    }

    /// One page of eligible songs, ordered by `id` for a stable cursor,
    /// used by the large-library reservoir sampler so it never has to
    /// materialize the whole eligible set at once.
    pub fn eligible_page(
        &self,
        user_id: &str,
        cutoff: NaiveDateTime,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Song>, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let rows = songs::table
            .filter(songs::user_id.eq(user_id))
            .filter(songs::last_played.is_null().or(songs::last_played.lt(cutoff)))
            .filter(songs::last_skipped.is_null().or(songs::last_skipped.lt(cutoff)))
            .order(songs::id.asc())
            .limit(limit)
            .offset(offset)
            .select((
                songs::id,
                songs::user_id,
                songs::title,
                songs::artist,
                songs::album,
                songs::duration_seconds,
                songs::last_played,
                songs::last_skipped,
                songs::play_count,
                songs::skip_count,
                songs::cover_art_token,
            ))
            .load::<SongRow>(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(rows.into_iter().map(Song::from).collect())
    }

    pub fn record_play(&self, user_id: &str, song_id: &str, at: NaiveDateTime) -> Result<(), ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        diesel::update(songs::table.filter(songs::user_id.eq(user_id)).filter(songs::id.eq(song_id)))
            .set((
                songs::play_count.eq(songs::play_count + 1),
                songs::last_played.eq(at),
            ))
            .execute(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(())
    }

    pub fn record_skip(&self, user_id: &str, song_id: &str, at: NaiveDateTime) -> Result<(), ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        diesel::update(songs::table.filter(songs::user_id.eq(user_id)).filter(songs::id.eq(song_id)))
            .set((
                songs::skip_count.eq(songs::skip_count + 1),
                songs::last_skipped.eq(at),
            ))
            .execute(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(())
    }

    /// Aggregate `(plays, skips, songs)` used to invalidate the shuffle
    /// engine's empirical-prior cache.
    pub fn user_totals(&self, user_id: &str) -> Result<(i64, i64, i64), ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let (plays, skips): (Option<i64>, Option<i64>) = songs::table
            .filter(songs::user_id.eq(user_id))
            .select((diesel::dsl::sum(songs::play_count), diesel::dsl::sum(songs::skip_count)))
            .first(&mut conn)
            .map_err(ProxyError::from)?;
        let count: i64 = songs::table
            .filter(songs::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .map_err(ProxyError::from)?;
        Ok((plays.unwrap_or(0), skips.unwrap_or(0), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{build_pool, run_migrations};
    use crate::config::PoolConfig;

    fn test_repo() -> SongRepository {
        let cfg = PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime: std::time::Duration::from_secs(3600),
            max_idle_time: std::time::Duration::from_secs(600),
            health_check: false,
        };
        let pool = build_pool(":memory:", &cfg).expect("pool");
        run_migrations(&pool).expect("migrate");
        SongRepository::new(pool)
    }

    fn upstream(id: &str) -> UpstreamSong {
        UpstreamSong {
            id: id.into(),
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            duration_seconds: 200,
            cover_art_token: None,
        }
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let repo = test_repo();
        repo.upsert_songs("u1", &[upstream("s1")]).unwrap();
        let song = repo.get("u1", "s1").unwrap().expect("present");
        assert_eq!(song.play_count, 0);
    }

    #[test]
    fn upsert_preserves_counters_on_refresh() {
        let repo = test_repo();
        repo.upsert_songs("u1", &[upstream("s1")]).unwrap();
        repo.record_play("u1", "s1", chrono::Local::now().naive_local()).unwrap();
        repo.upsert_songs("u1", &[upstream("s1")]).unwrap();
        let song = repo.get("u1", "s1").unwrap().unwrap();
        assert_eq!(song.play_count, 1);
    }

    #[test]
    fn prune_removes_songs_not_in_current_set() {
        let repo = test_repo();
        repo.upsert_songs("u1", &[upstream("s1"), upstream("s2")]).unwrap();
        let deleted = repo.prune_missing("u1", &["s1".to_string()]).unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get("u1", "s2").unwrap().is_none());
    }

    #[test]
    fn eligible_count_matches_eligible_page_total() {
        let repo = test_repo();
        let batch: Vec<_> = (0..5).map(|i| upstream(&format!("s{i}"))).collect();
        repo.upsert_songs("u1", &batch).unwrap();
        let cutoff = chrono::Local::now().naive_local();
        assert_eq!(repo.eligible_count("u1", cutoff).unwrap(), 5);
    }

    #[test]
    fn eligible_page_pages_through_in_order() {
        let repo = test_repo();
        let batch: Vec<_> = (0..5).map(|i| upstream(&format!("s{i}"))).collect();
        repo.upsert_songs("u1", &batch).unwrap();
        let cutoff = chrono::Local::now().naive_local();
        let first = repo.eligible_page("u1", cutoff, 2, 0).unwrap();
        let second = repo.eligible_page("u1", cutoff, 2, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_ne!(first[0].id, second[0].id);
    }
}
