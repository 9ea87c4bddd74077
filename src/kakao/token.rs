//! Kakao OAuth access-token cache.
//!
//! Access tokens live a few hours; refreshing on every run trips Kakao's
//! token rate limit (`KOE237`). The last token is kept in a small JSON file
//! and reused while it is valid:
//!
//! ```json
//! { "access_token": "…", "expires_at": 1736200000000, "refreshed_at": 1736185600000 }
//! ```
//!
//! When Kakao rotates the refresh token, the new one is cached too and wins
//! over the configured one.

use crate::api::{ApiError, RetryPolicy, retry_with_backoff};
use crate::utils::{now_ms, truncate_for_log};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Stored expiry is this much earlier than the real one.
pub const EXPIRY_MARGIN_MS: i64 = 60_000;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Retries after a `KOE237` answer.
pub const RATE_LIMIT_RETRIES: usize = 4;
pub const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenCache {
    pub access_token: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
    #[serde(default)]
    pub refreshed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenCache {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.access_token.is_empty() && self.expires_at > now_ms
    }
}

/// Read the cache file. A missing or unreadable file is simply no cache.
pub async fn load_cache(path: &Path) -> Option<TokenCache> {
    let raw = fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<TokenCache>(&raw) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable token cache");
            None
        }
    }
}

pub async fn save_cache(path: &Path, cache: &TokenCache) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(cache).map_err(std::io::Error::other)?;
    fs::write(path, json).await
}

/// `KOE237` is Kakao's "token request rate limit exceeded".
pub fn is_rate_limited(json: &Value) -> bool {
    ["error_code", "error", "code"]
        .iter()
        .filter_map(|k| json.get(*k))
        .any(|v| v.as_str().is_some_and(|s| s.contains("KOE237")))
        || json
            .get("error_description")
            .and_then(Value::as_str)
            .is_some_and(|s| s.contains("KOE237"))
}

/// Turn a token endpoint reply into a cache entry, or classify the failure.
pub fn cache_from_response(json: &Value, now_ms: i64) -> Result<TokenCache, ApiError> {
    let Some(access_token) = json.get("access_token").and_then(Value::as_str) else {
        let body = truncate_for_log(&json.to_string(), 400);
        if is_rate_limited(json) {
            return Err(ApiError::transient(format!("token rate limited: {body}")));
        }
        return Err(ApiError::fatal(format!("token refresh failed: {body}")));
    };
    let expires_in = json
        .get("expires_in")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Ok(TokenCache {
        access_token: access_token.to_string(),
        expires_at: now_ms + expires_in * 1000 - EXPIRY_MARGIN_MS,
        refreshed_at: now_ms,
        refresh_token: json
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// The refresh token for the next grant: a rotated one from the cache wins
/// over the configured one.
pub fn refresh_token_for(cached: Option<&TokenCache>, configured: &str) -> String {
    cached
        .and_then(|c| c.refresh_token.as_deref())
        .filter(|t| !t.is_empty())
        .unwrap_or(configured)
        .to_string()
}

/// Kakao only returns a refresh token when it rotates one. A rotated token
/// used for this grant stays cached when the reply carries none.
pub fn keep_rotated(mut cache: TokenCache, used: &str, configured: &str) -> TokenCache {
    if cache.refresh_token.is_none() && !used.is_empty() && used != configured {
        cache.refresh_token = Some(used.to_string());
    }
    cache
}

/// Credentials for the refresh grant.
#[derive(Clone)]
pub struct KakaoCredentials {
    pub rest_key: String,
    pub refresh_token: String,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for KakaoCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KakaoCredentials")
            .field("rest_key", &"<redacted>")
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug)]
pub struct TokenStore {
    http: reqwest::Client,
    token_url: String,
    credentials: KakaoCredentials,
    cache_path: PathBuf,
    policy: RetryPolicy,
}

impl TokenStore {
    pub fn new(http: reqwest::Client, auth_base: &str, credentials: KakaoCredentials, cache_path: impl Into<PathBuf>) -> Self {
        let mut policy = RetryPolicy::new(RATE_LIMIT_RETRIES + 1, RATE_LIMIT_BASE_DELAY);
        policy.max_delay = Duration::from_secs(30);
        Self {
            http,
            token_url: format!("{}/oauth/token", auth_base.trim_end_matches('/')),
            credentials,
            cache_path: cache_path.into(),
            policy,
        }
    }

    /// A valid access token, from the cache when possible.
    #[instrument(level = "info", skip(self))]
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let cached = load_cache(&self.cache_path).await;
        if let Some(cache) = cached.as_ref().filter(|c| c.is_valid_at(now_ms())) {
            debug!("Kakao token cache hit");
            return Ok(cache.access_token.clone());
        }
        let refresh_token = refresh_token_for(cached.as_ref(), &self.credentials.refresh_token);
        self.refresh(&refresh_token).await
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        if let Some(mut cache) = load_cache(&self.cache_path).await {
            cache.expires_at = 0;
            if let Err(e) = save_cache(&self.cache_path, &cache).await {
                warn!(error = %e, "Could not invalidate token cache");
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        if self.credentials.rest_key.is_empty() || refresh_token.is_empty() {
            return Err(ApiError::fatal("KAKAO_REST_KEY / KAKAO_REFRESH_TOKEN missing"));
        }
        info!("Refreshing Kakao access token");

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.rest_key.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = self.credentials.client_secret.as_deref().filter(|s| !s.is_empty()) {
            form.push(("client_secret", secret));
        }

        let cache = retry_with_backoff("kakao_token", &self.policy, |_| {
            let form = &form;
            async move {
                let res = self.http.post(&self.token_url).form(form).send().await?;
                let status = res.status().as_u16();
                let json: Value = res.json().await.unwrap_or(Value::Null);
                match cache_from_response(&json, now_ms()) {
                    Err(ApiError::Fatal { message, .. }) if status >= 500 => {
                        Err(ApiError::from_status(status, message, None))
                    }
                    other => other,
                }
            }
        })
        .await?;
        let cache = keep_rotated(cache, refresh_token, &self.credentials.refresh_token);

        if let Err(e) = save_cache(&self.cache_path, &cache).await {
            warn!(path = %self.cache_path.display(), error = %e, "Could not write token cache");
        }
        info!(expires_at = cache.expires_at, rotated = cache.refresh_token.is_some(), "Kakao access token refreshed");
        Ok(cache.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_from_response() {
        let json = json!({"access_token": "tok", "expires_in": 21599, "token_type": "bearer"});
        let cache = cache_from_response(&json, 1_000_000).unwrap();
        assert_eq!(cache.access_token, "tok");
        assert_eq!(cache.expires_at, 1_000_000 + 21_599_000 - 60_000);
        assert_eq!(cache.refreshed_at, 1_000_000);
        assert_eq!(cache.refresh_token, None);
    }

    #[test]
    fn test_cache_from_response_defaults_expiry_and_keeps_rotation() {
        let json = json!({"access_token": "tok", "refresh_token": "new-refresh"});
        let cache = cache_from_response(&json, 0).unwrap();
        assert_eq!(cache.expires_at, 3_600_000 - 60_000);
        assert_eq!(cache.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_rate_limit_is_transient_other_errors_fatal() {
        let limited = json!({"error": "invalid_request", "error_code": "KOE237", "error_description": "token request rate limit exceeded"});
        assert!(cache_from_response(&limited, 0).unwrap_err().is_transient());

        let invalid = json!({"error": "invalid_grant", "error_code": "KOE322"});
        assert!(!cache_from_response(&invalid, 0).unwrap_err().is_transient());
    }

    fn entry(refresh_token: Option<&str>) -> TokenCache {
        TokenCache {
            access_token: "t".to_string(),
            expires_at: 0,
            refreshed_at: 0,
            refresh_token: refresh_token.map(str::to_string),
        }
    }

    #[test]
    fn test_refresh_token_selection() {
        assert_eq!(refresh_token_for(None, "R1"), "R1");
        assert_eq!(refresh_token_for(Some(&entry(None)), "R1"), "R1");
        assert_eq!(refresh_token_for(Some(&entry(Some(""))), "R1"), "R1");
        assert_eq!(refresh_token_for(Some(&entry(Some("R2"))), "R1"), "R2");
    }

    #[test]
    fn test_rotated_token_survives_non_rotating_refresh() {
        // Run N: Kakao rotates R1 into R2.
        let rotated = keep_rotated(
            cache_from_response(&json!({"access_token": "a1", "refresh_token": "R2"}), 0).unwrap(),
            "R1",
            "R1",
        );
        assert_eq!(rotated.refresh_token.as_deref(), Some("R2"));

        // Run N+1: the grant uses R2 and the reply does not rotate.
        let used = refresh_token_for(Some(&rotated), "R1");
        assert_eq!(used, "R2");
        let next = keep_rotated(cache_from_response(&json!({"access_token": "a2"}), 0).unwrap(), &used, "R1");
        assert_eq!(next.refresh_token.as_deref(), Some("R2"));

        // Run N+2 still grants with R2.
        assert_eq!(refresh_token_for(Some(&next), "R1"), "R2");
    }

    #[test]
    fn test_configured_token_is_not_cached() {
        let cache = keep_rotated(cache_from_response(&json!({"access_token": "a"}), 0).unwrap(), "R1", "R1");
        assert_eq!(cache.refresh_token, None);
    }

    #[test]
    fn test_validity() {
        let cache = TokenCache {
            access_token: "t".to_string(),
            expires_at: 100,
            refreshed_at: 0,
            refresh_token: None,
        };
        assert!(cache.is_valid_at(99));
        assert!(!cache.is_valid_at(100));
    }

    #[tokio::test]
    async fn test_cache_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/kakao_token.json");
        assert_eq!(load_cache(&path).await, None);

        let cache = TokenCache {
            access_token: "t".to_string(),
            expires_at: 5,
            refreshed_at: 1,
            refresh_token: Some("r".to_string()),
        };
        save_cache(&path, &cache).await.unwrap();
        assert_eq!(load_cache(&path).await, Some(cache));

        tokio::fs::write(&path, "not json").await.unwrap();
        assert_eq!(load_cache(&path).await, None);
    }

    #[tokio::test]
    async fn test_valid_cache_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let cache = TokenCache {
            access_token: "cached".to_string(),
            expires_at: now_ms() + 600_000,
            refreshed_at: now_ms(),
            refresh_token: None,
        };
        save_cache(&path, &cache).await.unwrap();

        // The auth base is unroutable; only a cache hit can succeed.
        let store = TokenStore::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            KakaoCredentials {
                rest_key: "k".to_string(),
                refresh_token: "r".to_string(),
                client_secret: None,
            },
            &path,
        );
        assert_eq!(store.access_token().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn test_missing_credentials_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            KakaoCredentials {
                rest_key: String::new(),
                refresh_token: String::new(),
                client_secret: None,
            },
            dir.path().join("token.json"),
        );
        let err = store.access_token().await.unwrap_err();
        assert!(!err.is_transient());
    }
}
