//! The hook pipeline is data, not a dispatch tree: one catch-all route maps
//! a Subsonic endpoint path to zero or more hooks via a `HashMap`, instead
//! of registering a handler function per endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use serde_json::json;

use crate::error::ProxyError;
use crate::response::ok_envelope;
use crate::scrobble::ScrobbleOutcome;
use crate::state::AppState;

/// Everything a hook needs to know about the inbound request.
#[derive(Clone)]
pub struct HookContext {
    pub user_id: String,
    pub params: HashMap<String, String>,
    pub now: NaiveDateTime,
}

impl HookContext {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// What a hook decided to do with the request.
pub enum HookAction {
    /// Let the pipeline continue: run the next hook, or forward upstream if
    /// this was the last one.
    Continue,
    /// Answer the request directly; no further hooks run and nothing is
    /// forwarded upstream.
    Respond(Response),
}

pub type HookFn = Arc<
    dyn Fn(Arc<AppState>, HookContext) -> BoxFuture<'static, Result<HookAction, ProxyError>> + Send + Sync,
>;

#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<&'static str, Vec<HookFn>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: HashMap::new() }
    }

    pub fn register(&mut self, path: &'static str, hook: HookFn) {
        self.hooks.entry(path).or_default().push(hook);
    }

    pub fn hooks_for(&self, path: &str) -> &[HookFn] {
        self.hooks.get(path).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The default hook set: `scrobble` drives the listening model, `stream`
/// marks a song as now-playing, `getRandomSongs` answers from the shuffle
/// engine instead of forwarding to the upstream.
pub fn default_registry() -> HookRegistry {
    let mut registry = HookRegistry::new();

    registry.register(
        "/rest/stream",
        Arc::new(|state, ctx| Box::pin(stream_hook(state, ctx))),
    );
    registry.register(
        "/rest/scrobble",
        Arc::new(|state, ctx| Box::pin(scrobble_hook(state, ctx))),
    );
    registry.register(
        "/rest/getRandomSongs",
        Arc::new(|state, ctx| Box::pin(get_random_songs_hook(state, ctx))),
    );

    registry
}

async fn stream_hook(state: Arc<AppState>, ctx: HookContext) -> Result<HookAction, ProxyError> {
    let Some(song_id) = ctx.param("id").map(str::to_string) else {
        return Ok(HookAction::Continue);
    };
    if let Some(song) = state.songs.get(&ctx.user_id, &song_id)? {
        state
            .scrobble
            .now_playing(&ctx.user_id, &song_id, &song.artist, song.duration_seconds, ctx.now)?;
        state.shuffle.note_started(&ctx.user_id, &song_id);
    }
    Ok(HookAction::Continue)
}

async fn scrobble_hook(state: Arc<AppState>, ctx: HookContext) -> Result<HookAction, ProxyError> {
    let song_id = ctx
        .param("id")
        .ok_or_else(|| ProxyError::validation("missing_parameter", "scrobble requires `id`"))?
        .to_string();
    let submission = ctx
        .param("submission")
        .map(|v| v != "false")
        .unwrap_or(true);

    let outcome = if submission {
        state.scrobble.submit(&ctx.user_id, &song_id, ctx.now)?
    } else {
        let song = state
            .songs
            .get(&ctx.user_id, &song_id)?
            .ok_or_else(|| ProxyError::validation("unknown_song", "scrobble target not found in library"))?;
        state.shuffle.note_started(&ctx.user_id, &song_id);
        state
            .scrobble
            .now_playing(&ctx.user_id, &song_id, &song.artist, song.duration_seconds, ctx.now)?
    };

    let recorded = !matches!(outcome, ScrobbleOutcome::NoRecord);
    Ok(HookAction::Respond(
        ok_envelope(json!({ "recorded": recorded })).into_response(),
    ))
}

async fn get_random_songs_hook(state: Arc<AppState>, ctx: HookContext) -> Result<HookAction, ProxyError> {
    let size: usize = ctx
        .param("size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10)
        .clamp(1, 500);

    let songs = state.shuffle.pick_random(&ctx.user_id, size, ctx.now)?;
    let dto: Vec<_> = songs
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "title": s.title,
                "artist": s.artist,
                "album": s.album,
                "duration": s.duration_seconds,
                "coverArt": s.cover_art_token,
            })
        })
        .collect();

    Ok(HookAction::Respond(
        ok_envelope(json!({ "randomSongs": { "song": dto } })).into_response(),
    ))
}
