//! In-memory credential cache, validated against the upstream server once
//! and held for the lifetime of the process — the "arena + index" shared
//! state pattern applied to `user -> password` pairs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;

use crate::error::ProxyError;

#[derive(Clone)]
pub struct CredentialStore {
    upstream_base: url::Url,
    client: Client,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl CredentialStore {
    pub fn new(upstream_base: url::Url) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client with timeout should always build");
        Self {
            upstream_base,
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get(&self, user: &str) -> Option<String> {
        self.cache.read().get(user).cloned()
    }

    /// Every known `(user, password)` pair, sorted by user for deterministic
    /// iteration in the background sync loop.
    pub fn all_sorted(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .cache
            .read()
            .iter()
            .map(|(u, p)| (u.clone(), p.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    /// Validates `user`/`password` against the upstream `ping` endpoint and,
    /// on success, caches the pair for subsequent requests. Already-cached
    /// credentials that match are accepted without another round trip.
    pub async fn validate_and_store(&self, user: &str, password: &str) -> Result<(), ProxyError> {
        if self.get(user).as_deref() == Some(password) {
            return Ok(());
        }

        let mut url = self.upstream_base.clone();
        url.set_path("/rest/ping");
        url.query_pairs_mut()
            .append_pair("u", user)
            .append_pair("p", password)
            .append_pair("v", "1.15.0")
            .append_pair("c", "subsoxy")
            .append_pair("f", "json");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::credentials(
                "upstream_rejected",
                format!("upstream ping returned status {status}"),
            )
            .with_context("user", user));
        }

        let body: serde_json::Value = response.json().await?;
        let status_field = body
            .get("subsonic-response")
            .and_then(|r| r.get("status"))
            .and_then(|s| s.as_str());
        if status_field != Some("ok") {
            return Err(ProxyError::credentials(
                "upstream_rejected",
                "upstream ping reported a non-ok status",
            )
            .with_context("user", user));
        }

        self.cache.write().insert(user.to_string(), password.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new(url::Url::parse("http://localhost:4040").unwrap())
    }

    #[test]
    fn unknown_user_has_no_cached_password() {
        let store = store();
        assert_eq!(store.get("alice"), None);
    }

    #[test]
    fn all_sorted_is_empty_initially() {
        let store = store();
        assert!(store.all_sorted().is_empty());
    }
}
