//! The `subsonic-response` JSON envelope, used whenever this proxy answers
//! a request itself instead of forwarding the upstream's own envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{ErrorCategory, ProxyError};

const API_VERSION: &str = "1.15.0";

/// A Subsonic error code. The exact numbering follows the upstream API;
/// this proxy only ever emits a handful of these itself.
fn subsonic_error_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Credentials => 40,
        ErrorCategory::Validation => 10,
        ErrorCategory::Network => 0,
        ErrorCategory::Database | ErrorCategory::Server | ErrorCategory::Config => 0,
    }
}

pub fn ok_envelope(extra: Value) -> Response {
    let mut body = json!({
        "status": "ok",
        "version": API_VERSION,
    });
    if let Value::Object(extra_map) = extra {
        if let Value::Object(map) = &mut body {
            map.extend(extra_map);
        }
    }
    Json(json!({ "subsonic-response": body })).into_response()
}

/// Renders a `ProxyError` as a `subsonic-response` envelope with a matching
/// HTTP status, per the error handling design's mapping from category to
/// wire-level status.
pub fn error_envelope(err: &ProxyError) -> Response {
    let status = match err.category {
        ErrorCategory::Credentials => StatusCode::UNAUTHORIZED,
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Network => StatusCode::BAD_GATEWAY,
        ErrorCategory::Database | ErrorCategory::Server | ErrorCategory::Config => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({
        "subsonic-response": {
            "status": "failed",
            "version": API_VERSION,
            "error": {
                "code": subsonic_error_code(err.category),
                "message": err.message,
            },
        }
    });
    (status, Json(body)).into_response()
}

#[derive(Serialize)]
pub struct SubsonicEnvelope<T: Serialize> {
    #[serde(rename = "subsonic-response")]
    pub response: T,
}

impl<T: Serialize> IntoResponse for SubsonicEnvelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_error_maps_to_unauthorized() {
        let err = ProxyError::credentials("invalid_credentials", "bad password");
        let response = error_envelope(&err);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn validation_error_maps_to_bad_request() {
        let err = ProxyError::validation("missing_parameter", "id required");
        let response = error_envelope(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_error_maps_to_internal_server_error() {
        let err = ProxyError::server("hook_execution_failed", "boom");
        let response = error_envelope(&err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
