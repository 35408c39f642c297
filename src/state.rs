//! Wires every subsystem together behind one shared, cheaply-cloneable
//! handle passed through axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Client;

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::db::{self, ArtistStatsRepository, DbPool, PlayEventRepository, SongRepository, TransitionRepository};
use crate::error::ProxyError;
use crate::proxy::hooks::{default_registry, HookRegistry};
use crate::rate_limit::RateLimiter;
use crate::scrobble::ScrobbleTracker;
use crate::shuffle::ShuffleEngine;
use crate::upstream::UpstreamClient;

/// Fallback now-playing window when a song's duration is unknown.
const DEFAULT_DURATION_UNKNOWN_FALLBACK: Duration = Duration::from_secs(3600);

pub struct AppState {
    pub upstream_base: url::Url,
    pub http_client: Client,
    pub db_pool: DbPool,
    pub songs: SongRepository,
    pub credentials: CredentialStore,
    pub rate_limiter: RateLimiter,
    pub scrobble: ScrobbleTracker,
    pub shuffle: ShuffleEngine,
    pub hooks: HookRegistry,
    pub upstream_client: UpstreamClient,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Arc<Self>, ProxyError> {
        let pool = db::build_pool(&config.db_path, &config.pool)?;
        db::run_migrations(&pool)?;

        let songs = SongRepository::new(pool.clone());
        let play_events = PlayEventRepository::new(pool.clone());
        let transitions = TransitionRepository::new(pool.clone());
        let artists = ArtistStatsRepository::new(pool.clone());

        let scrobble = ScrobbleTracker::new(
            songs.clone(),
            play_events,
            transitions.clone(),
            artists.clone(),
            DEFAULT_DURATION_UNKNOWN_FALLBACK,
        );
        let shuffle = ShuffleEngine::new(songs.clone(), transitions, artists, StdRng::from_os_rng());

        let http_client = Client::builder()
            .build()
            .map_err(|e| ProxyError::server("http_client_build_failed", e.to_string()))?;

        Ok(Arc::new(Self {
            upstream_base: config.upstream_url.clone(),
            http_client,
            db_pool: pool,
            songs,
            credentials: CredentialStore::new(config.upstream_url.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit.rps, config.rate_limit.burst, config.rate_limit.enabled),
            scrobble,
            shuffle,
            hooks: default_registry(),
            upstream_client: UpstreamClient::new(config.upstream_url.clone()),
        }))
    }
}
