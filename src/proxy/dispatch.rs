//! The single catch-all handler for every `/rest/*` request: rate limit,
//! validate credentials, run any hooks registered for the endpoint, and
//! forward whatever's left to the upstream server.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;
use crate::proxy::hooks::{HookAction, HookContext};
use crate::response::error_envelope;
use crate::state::AppState;

/// `/rest/scrobble.view` and `/rest/scrobble` both dispatch on `scrobble`.
fn endpoint_path(uri_path: &str) -> String {
    let trimmed = uri_path.trim_end_matches(".view");
    trimmed.to_string()
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default()
}

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match handle(state, uri, method, headers, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, code = %err.full_code(), "request failed");
            error_envelope(&err)
        }
    }
}

async fn handle(
    state: Arc<AppState>,
    uri: axum::http::Uri,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProxyError> {
    let params = parse_query(uri.query());
    let path = endpoint_path(uri.path());

    let user = params
        .get("u")
        .cloned()
        .ok_or_else(|| ProxyError::validation("missing_parameter", "`u` is required"))?;

    if !state.rate_limiter.check(&user) {
        return Err(ProxyError::server("rate_limited", "too many requests").with_context("user", user));
    }

    if let Some(password) = params.get("p") {
        state.credentials.validate_and_store(&user, password).await?;
    }

    let now = chrono::Local::now().naive_local();
    let ctx = HookContext {
        user_id: user,
        params,
        now,
    };

    for hook in state.hooks.hooks_for(&path) {
        match hook(state.clone(), ctx.clone()).await? {
            HookAction::Respond(response) => return Ok(response),
            HookAction::Continue => continue,
        }
    }

    forward_upstream(&state, &uri, method, headers, body).await
}

/// Reverse-proxies whatever the hook pipeline didn't answer itself,
/// forwarding headers and streaming the body back unmodified.
async fn forward_upstream(
    state: &AppState,
    uri: &axum::http::Uri,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProxyError> {
    let mut target = state.upstream_base.clone();
    target.set_path(uri.path());
    target.set_query(uri.query());

    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ProxyError::server("body_read_failed", e.to_string()))?;

    let mut request = state.http_client.request(method, target.as_str());
    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        request = request.header(name, value);
    }
    let upstream_response = request.body(body_bytes).send().await?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_response.headers().iter() {
        response_headers.insert(name.clone(), value.clone());
    }

    // Streamed rather than buffered: `stream` responses carry whole audio
    // files, which have no business passing through as one `Bytes` blob.
    let body = Body::from_stream(upstream_response.bytes_stream());
    let mut response = (status, body).into_response();
    *response.headers_mut() = response_headers;
    Ok(response)
}
