pub mod connection;
pub mod schema;

pub mod artist_stats_repo;
pub mod play_event_repo;
pub mod song_repo;
pub mod transition_repo;

pub use artist_stats_repo::ArtistStatsRepository;
pub use connection::{build_pool, run_migrations, spawn_health_check, DbPool};
pub use play_event_repo::PlayEventRepository;
pub use song_repo::SongRepository;
pub use transition_repo::TransitionRepository;
