//! Append-only play event log.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::db::schema::play_events;
use crate::db::DbPool;
use crate::error::ProxyError;
use crate::models::{EventKind, PlayEvent};

#[derive(Queryable, Debug, Clone)]
struct PlayEventRow {
    #[allow(dead_code)]
    id: i32,
    user_id: String,
    song_id: String,
    event_type: String,
    timestamp: NaiveDateTime,
    previous_song_id: Option<String>,
}

impl TryFrom<PlayEventRow> for PlayEvent {
    type Error = ProxyError;

    fn try_from(r: PlayEventRow) -> Result<Self, Self::Error> {
        let event_type = EventKind::from_str(&r.event_type).ok_or_else(|| {
            ProxyError::database("corrupt_event_kind", format!("unrecognized event_type `{}`", r.event_type))
        })?;
        Ok(PlayEvent {
            user_id: r.user_id,
            song_id: r.song_id,
            event_type,
            timestamp: r.timestamp,
            previous_song_id: r.previous_song_id,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = play_events)]
struct NewPlayEvent<'a> {
    user_id: &'a str,
    song_id: &'a str,
    event_type: &'a str,
    timestamp: NaiveDateTime,
    previous_song_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct PlayEventRepository {
    pool: DbPool,
}

impl PlayEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn insert(&self, event: &PlayEvent) -> Result<(), ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let row = NewPlayEvent {
            user_id: &event.user_id,
            song_id: &event.song_id,
            event_type: event.event_type.as_str(),
            timestamp: event.timestamp,
            previous_song_id: event.previous_song_id.as_deref(),
        };
        diesel::insert_into(play_events::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(ProxyError::from)?;
        Ok(())
    }

    /// The most recent event recorded for `user_id`, used to detect implicit
    /// skips when a new `start` arrives before the previous song finished.
    pub fn most_recent(&self, user_id: &str) -> Result<Option<PlayEvent>, ProxyError> {
        let mut conn = self.pool.get().map_err(ProxyError::from)?;
        let row = play_events::table
            .filter(play_events::user_id.eq(user_id))
            .order(play_events::timestamp.desc())
            .select((
                play_events::id,
                play_events::user_id,
                play_events::song_id,
                play_events::event_type,
                play_events::timestamp,
                play_events::previous_song_id,
            ))
            .first::<PlayEventRow>(&mut conn)
            .optional()
            .map_err(ProxyError::from)?;
        row.map(PlayEvent::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::db::connection::{build_pool, run_migrations};

    fn test_repo() -> PlayEventRepository {
        let cfg = PoolConfig {
            max_open: 1,
            max_idle: 1,
            max_lifetime: std::time::Duration::from_secs(3600),
            max_idle_time: std::time::Duration::from_secs(600),
            health_check: false,
        };
        let pool = build_pool(":memory:", &cfg).expect("pool");
        run_migrations(&pool).expect("migrate");
        PlayEventRepository::new(pool)
    }

    #[test]
    fn most_recent_returns_latest_event() {
        let repo = test_repo();
        let now = chrono::Local::now().naive_local();
        repo.insert(&PlayEvent {
            user_id: "u1".into(),
            song_id: "s1".into(),
            event_type: EventKind::Start,
            timestamp: now - chrono::Duration::seconds(10),
            previous_song_id: None,
        })
        .unwrap();
        repo.insert(&PlayEvent {
            user_id: "u1".into(),
            song_id: "s2".into(),
            event_type: EventKind::Start,
            timestamp: now,
            previous_song_id: Some("s1".into()),
        })
        .unwrap();
        let latest = repo.most_recent("u1").unwrap().unwrap();
        assert_eq!(latest.song_id, "s2");
    }

    #[test]
    fn most_recent_none_when_empty() {
        let repo = test_repo();
        assert!(repo.most_recent("u1").unwrap().is_none());
    }
}
