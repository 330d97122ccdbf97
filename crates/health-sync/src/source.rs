//! Read side: the on-device health store, reached through a local bridge.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use migraineme_core::health::RecordType;
use migraineme_core::sync::HEALTH_SYNC_REQUEST_TIMEOUT_SECS;

use crate::error::{HealthSyncError, Result};
use crate::types::{ChangesPage, ChangesTokenRequest, ChangesTokenResponse, RecordsPage, TimeRange};

/// Incremental and windowed reads from the health store.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Issue a fresh changes token covering `record_types`.
    async fn changes_token(&self, record_types: &[RecordType]) -> Result<String>;

    /// One page of changes since `token`.
    async fn changes(&self, token: &str) -> Result<ChangesPage>;

    /// One page of records of `record_type` inside `range`.
    async fn read_records(
        &self,
        record_type: RecordType,
        range: TimeRange,
        page_token: Option<String>,
    ) -> Result<RecordsPage>;
}

/// HTTP client for the device bridge.
#[derive(Debug, Clone)]
pub struct HttpHealthSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHealthSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HEALTH_SYNC_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!("[HealthSync] Bridge error ({}): {}", status, body);
            return Err(HealthSyncError::api(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl HealthSource for HttpHealthSource {
    async fn changes_token(&self, record_types: &[RecordType]) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/changes/token", self.base_url))
            .json(&ChangesTokenRequest {
                record_types: record_types.to_vec(),
            })
            .send()
            .await?;
        let token: ChangesTokenResponse = Self::parse(response).await?;
        Ok(token.token)
    }

    async fn changes(&self, token: &str) -> Result<ChangesPage> {
        let response = self
            .client
            .get(format!("{}/v1/changes", self.base_url))
            .query(&[("token", token)])
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn read_records(
        &self,
        record_type: RecordType,
        range: TimeRange,
        page_token: Option<String>,
    ) -> Result<RecordsPage> {
        let mut query = vec![
            ("type", record_type.as_str().to_string()),
            ("start", range.start.to_rfc3339()),
            ("end", range.end.to_rfc3339()),
        ];
        if let Some(page_token) = page_token {
            query.push(("page_token", page_token));
        }
        let response = self
            .client
            .get(format!("{}/v1/records", self.base_url))
            .query(&query)
            .send()
            .await?;
        Self::parse(response).await
    }
}
