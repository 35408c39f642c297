//! SQLite connection pooling, following the teacher's `DbConfig`/`DbPool`
//! customizer shape but re-targeted at this system's four tables.

use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;

use crate::config::PoolConfig;
use crate::error::ProxyError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct SqliteConnectionCustomizer;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqliteConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA mmap_size = 268435456;
            ",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn build_pool(db_path: &str, config: &PoolConfig) -> Result<DbPool, ProxyError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(config.max_open)
        .min_idle(Some(config.max_idle))
        .max_lifetime(Some(config.max_lifetime))
        .idle_timeout(Some(config.max_idle_time))
        .connection_customizer(Box::new(SqliteConnectionCustomizer))
        .build(manager)
        .map_err(|e| {
            ProxyError::database("pool_build_failed", format!("failed to build connection pool: {e}"))
                .with_context("db_path", db_path)
        })?;
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), ProxyError> {
    let mut conn = pool.get().map_err(ProxyError::from)?;
    conn.batch_execute(
        "
        CREATE TABLE IF NOT EXISTS songs (
            user_id TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL,
            last_played TIMESTAMP,
            last_skipped TIMESTAMP,
            play_count BIGINT NOT NULL DEFAULT 0,
            skip_count BIGINT NOT NULL DEFAULT 0,
            cover_art_token TEXT,
            PRIMARY KEY (user_id, id)
        );
        CREATE INDEX IF NOT EXISTS songs_user_last_played ON songs (user_id, last_played);
        CREATE INDEX IF NOT EXISTS songs_user_last_skipped ON songs (user_id, last_skipped);

        CREATE TABLE IF NOT EXISTS play_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            song_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            timestamp TIMESTAMP NOT NULL,
            previous_song_id TEXT
        );
        CREATE INDEX IF NOT EXISTS play_events_user_timestamp ON play_events (user_id, timestamp);

        CREATE TABLE IF NOT EXISTS song_transitions (
            user_id TEXT NOT NULL,
            from_song_id TEXT NOT NULL,
            to_song_id TEXT NOT NULL,
            play_count BIGINT NOT NULL DEFAULT 0,
            skip_count BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, from_song_id, to_song_id)
        );

        CREATE TABLE IF NOT EXISTS artist_stats (
            user_id TEXT NOT NULL,
            artist TEXT NOT NULL,
            play_count BIGINT NOT NULL DEFAULT 0,
            skip_count BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, artist)
        );
        ",
    )
    .map_err(|e| ProxyError::database("migration_failed", format!("failed to run migrations: {e}")))
}

/// Periodically calls `SELECT 1` against the pool and logs a warning on
/// failure. Stops when `shutdown` fires, mirroring the background sync
/// loop's broadcast-channel shutdown pattern.
pub async fn spawn_health_check(
    pool: Arc<DbPool>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pool = pool.clone();
                let result = tokio::task::spawn_blocking(move || {
                    pool.get().and_then(|mut conn| conn.batch_execute("SELECT 1").map_err(diesel::r2d2::Error::QueryError))
                })
                .await;
                match result {
                    Ok(Ok(())) => tracing::debug!("database health check ok"),
                    Ok(Err(e)) => tracing::warn!(error = %e, "database health check failed"),
                    Err(e) => tracing::warn!(error = %e, "database health check task panicked"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("database health check worker shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use diesel::RunQueryDsl;

    fn test_config() -> PoolConfig {
        PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime: Duration::from_secs(3600),
            max_idle_time: Duration::from_secs(600),
            health_check: false,
        }
    }

    #[test]
    fn migrations_run_against_a_real_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("subsoxy-test.db");
        let pool = build_pool(path.to_str().unwrap(), &test_config()).expect("pool");
        run_migrations(&pool).expect("migrate");
        assert!(path.exists());
    }

    #[test]
    fn reopening_the_same_file_preserves_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("subsoxy-test.db");
        let path_str = path.to_str().unwrap().to_string();

        {
            let pool = build_pool(&path_str, &test_config()).expect("pool");
            run_migrations(&pool).expect("migrate");
            let mut conn = pool.get().expect("conn");
            conn.batch_execute(
                "INSERT INTO songs (user_id, id, title, artist, album, duration_seconds) VALUES ('u1', 's1', 't', 'a', 'al', 100);",
            )
            .expect("insert");
        }

        let pool = build_pool(&path_str, &test_config()).expect("pool");
        let mut conn = pool.get().expect("conn");
        let count: i64 = diesel::dsl::sql::<diesel::sql_types::BigInt>("SELECT COUNT(*) FROM songs")
            .get_result(&mut conn)
            .expect("count");
        assert_eq!(count, 1);
    }
}
