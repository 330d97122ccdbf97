//! Access token providers for backend requests.

use async_trait::async_trait;
use log::{debug, error};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use migraineme_core::sync::HEALTH_SYNC_REQUEST_TIMEOUT_SECS;

use crate::error::{HealthSyncError, Result};
use crate::types::{Session, SupabaseErrorResponse, SupabaseTokenResponse};

/// Refresh this many seconds before the reported expiry.
const TOKEN_EXPIRY_BUFFER_SECS: u64 = 60;

/// Assumed lifetime when the auth server omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Supplies an authenticated session for backend calls.
///
/// An error from `session()` is an auth failure: the push run stops and the
/// scheduler retries later.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn session(&self) -> Result<Session>;

    /// Forget any cached token after the backend rejected it.
    async fn invalidate(&self) {}
}

/// Fixed access token, mostly for tests and short-lived deployments.
pub struct StaticTokenProvider {
    session: Option<Session>,
}

impl StaticTokenProvider {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session: Some(Session {
                access_token: access_token.into(),
                user_id: user_id.into(),
            }),
        }
    }

    /// A provider with no session; every call fails with an auth error.
    pub fn signed_out() -> Self {
        Self { session: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn session(&self) -> Result<Session> {
        self.session
            .clone()
            .ok_or_else(|| HealthSyncError::auth("No session configured"))
    }
}

struct CachedSession {
    session: Session,
    refresh_token: String,
    expires_at: Option<Instant>,
}

impl CachedSession {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .map(|expires_at| expires_at > Instant::now())
            .unwrap_or(false)
    }
}

/// Exchanges a Supabase refresh token for access tokens.
///
/// Supabase rotates the refresh token on each use; the rotated value replaces
/// the cached one in memory.
pub struct SupabaseTokenProvider {
    client: reqwest::Client,
    auth_url: String,
    api_key: String,
    cache: RwLock<CachedSession>,
}

impl SupabaseTokenProvider {
    pub fn new(
        auth_url: &str,
        api_key: &str,
        refresh_token: &str,
        user_id: Option<&str>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HEALTH_SYNC_REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cache: RwLock::new(CachedSession {
                session: Session {
                    access_token: String::new(),
                    user_id: user_id.unwrap_or_default().to_string(),
                },
                refresh_token: refresh_token.to_string(),
                expires_at: None,
            }),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SupabaseTokenResponse> {
        let token_url = format!("{}/auth/v1/token", self.auth_url);
        debug!("[HealthSync] Refreshing access token from Supabase");

        let response = self
            .client
            .post(&token_url)
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<SupabaseErrorResponse>(&body)
                .ok()
                .and_then(|err| err.error_description.or(err.msg).or(err.error))
                .unwrap_or_else(|| format!("status {}", status));
            error!("[HealthSync] Token refresh failed: {}", message);
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(HealthSyncError::api(status.as_u16(), message));
            }
            return Err(HealthSyncError::auth(format!(
                "Session expired. Please sign in again. ({})",
                message
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl TokenProvider for SupabaseTokenProvider {
    async fn session(&self) -> Result<Session> {
        {
            let cache = self.cache.read().await;
            if cache.is_fresh() {
                return Ok(cache.session.clone());
            }
        }

        // Hold the write lock across the refresh so concurrent callers wait
        // instead of spending the same refresh token twice.
        let mut cache = self.cache.write().await;
        if cache.is_fresh() {
            return Ok(cache.session.clone());
        }

        let token_response = self.refresh(&cache.refresh_token).await?;
        let user_id = token_response
            .user
            .map(|user| user.id)
            .unwrap_or_else(|| cache.session.user_id.clone());
        if user_id.is_empty() {
            return Err(HealthSyncError::auth("Token response did not include a user id"));
        }

        let ttl = token_response
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
            .saturating_sub(TOKEN_EXPIRY_BUFFER_SECS);
        cache.refresh_token = token_response.refresh_token;
        cache.session = Session {
            access_token: token_response.access_token,
            user_id,
        };
        cache.expires_at = Some(Instant::now() + Duration::from_secs(ttl));

        debug!("[HealthSync] Access token refreshed and cached (TTL {}s)", ttl);
        Ok(cache.session.clone())
    }

    async fn invalidate(&self) {
        self.cache.write().await.expires_at = None;
    }
}
