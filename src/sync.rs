//! Background differential sync: periodically refreshes each known user's
//! library from the upstream server, preserving listening history on
//! songs that still exist and pruning ones that don't.

use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

pub async fn spawn_sync_loop(
    state: Arc<AppState>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => sync_once(&state).await,
            _ = shutdown.recv() => {
                tracing::info!("sync loop shutting down");
                break;
            }
        }
    }
}

/// Iterates known credentials in sorted order so repeated runs touch users
/// in a deterministic sequence, useful for reasoning about partial
/// failures in logs.
async fn sync_once(state: &AppState) {
    for (user, password) in state.credentials.all_sorted() {
        if let Err(err) = sync_user(state, &user, &password).await {
            tracing::warn!(user = %user, error = %err, code = %err.full_code(), "library sync failed for user");
        }
    }
}

async fn sync_user(state: &AppState, user: &str, password: &str) -> Result<(), crate::error::ProxyError> {
    let library = state.upstream_client.search_all_songs(user, password, "").await?;
    let current_ids: Vec<String> = library.iter().map(|s| s.id.clone()).collect();

    state.songs.upsert_songs(user, &library)?;
    let pruned = state.songs.prune_missing(user, &current_ids)?;

    tracing::info!(user = %user, synced = library.len(), pruned, "library sync complete");
    Ok(())
}
