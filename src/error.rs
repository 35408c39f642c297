//! Categorized, wrappable errors shared across the proxy.
//!
//! Mirrors the teacher's `ApiError`/`ErrorCode` pairing (one enum for the
//! Subsonic-facing error surface, one for the machine-readable category) but
//! generalized to the proxy's own taxonomy from the error handling design:
//! config, database, credentials, network, validation, server.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Top-level error category, used by chain predicates and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Config,
    Database,
    Credentials,
    Network,
    Validation,
    Server,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Config => "config",
            ErrorCategory::Database => "database",
            ErrorCategory::Credentials => "credentials",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Server => "server",
        };
        f.write_str(s)
    }
}

/// A categorized error with a stable code, a human message, a context map,
/// and an optional wrapped cause.
///
/// Context values must never contain a password; nothing in this module
/// accepts a raw password as a context value.
#[derive(Debug, Error)]
#[error("{category}.{code}: {message}")]
pub struct ProxyError {
    pub category: ErrorCategory,
    pub code: &'static str,
    pub message: String,
    pub context: HashMap<String, String>,
    #[source]
    pub cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ProxyError {
    fn new(category: ErrorCategory, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, code, message)
    }

    pub fn database(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Database, code, message)
    }

    pub fn credentials(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Credentials, code, message)
    }

    pub fn network(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, code, message)
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, code, message)
    }

    pub fn server(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Server, code, message)
    }

    /// Attach a named context field (never a password).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Machine-readable dotted code, e.g. `"database.connection_failed"`.
    pub fn full_code(&self) -> String {
        format!("{}.{}", self.category, self.code)
    }

    pub fn is_category(&self, category: ErrorCategory) -> bool {
        self.category == category
    }

    pub fn is_code(&self, code: &str) -> bool {
        self.code == code
    }
}

/// True if `err` or any error in its `source()` chain belongs to `category`.
pub fn chain_has_category(err: &(dyn StdError + 'static), category: ErrorCategory) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(proxy_err) = e.downcast_ref::<ProxyError>() {
            if proxy_err.is_category(category) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Walk `.source()` until no further cause remains.
pub fn unwrap_root(err: &(dyn StdError + 'static)) -> &(dyn StdError + 'static) {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}

impl From<diesel::result::Error> for ProxyError {
    fn from(e: diesel::result::Error) -> Self {
        ProxyError::database("query_failed", e.to_string()).with_cause(e)
    }
}

impl From<diesel::r2d2::Error> for ProxyError {
    fn from(e: diesel::r2d2::Error) -> Self {
        ProxyError::database("connection_failed", e.to_string()).with_cause(e)
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::network("timeout", e.to_string()).with_cause(e)
        } else {
            ProxyError::network("upstream_error", e.to_string()).with_cause(e)
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_code_is_dotted() {
        let e = ProxyError::database("connection_failed", "boom");
        assert_eq!(e.full_code(), "database.connection_failed");
    }

    #[test]
    fn chain_has_category_walks_source() {
        let inner = ProxyError::network("timeout", "upstream slow");
        let outer = ProxyError::server("hook_execution_failed", "stream hook failed").with_cause(inner);
        assert!(chain_has_category(&outer, ErrorCategory::Network));
        assert!(!chain_has_category(&outer, ErrorCategory::Config));
    }

    #[test]
    fn unwrap_root_finds_deepest_cause() {
        let root = ProxyError::validation("invalid_input", "bad id");
        let wrapped = ProxyError::server("proxy_setup_failed", "setup failed").with_cause(root);
        let deepest = unwrap_root(&wrapped);
        assert!(deepest.to_string().contains("invalid_input"));
    }

    #[test]
    fn context_roundtrips() {
        let e = ProxyError::validation("missing_parameter", "id required").with_context("song_id", "42");
        assert_eq!(e.context.get("song_id"), Some(&"42".to_string()));
    }
}
