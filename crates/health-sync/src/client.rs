//! Backend API client for writing health rows into Supabase.
//!
//! Rows go through PostgREST: one upsert endpoint per metric table with
//! merge-duplicates conflict resolution on `(user_id, source, date)`, and a
//! delete keyed by the source record id.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

use migraineme_core::health::RecordData;
use migraineme_core::sync::{OutboxEntry, HEALTH_SYNC_REQUEST_TIMEOUT_SECS};

use crate::error::{HealthSyncError, Result};
use crate::types::{PostgrestErrorResponse, Session};

const MAX_LOG_BODY_CHARS: usize = 512;
const UPSERT_CONFLICT_TARGET: &str = "user_id,source,date";
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";

/// Write side of the backend, one call per outbox entry.
#[async_trait]
pub trait HealthBackend: Send + Sync {
    async fn upsert_record(&self, session: &Session, entry: &OutboxEntry) -> Result<()>;
    async fn delete_record(&self, session: &Session, entry: &OutboxEntry) -> Result<()>;
}

/// Builds the backend row for an upsert entry.
///
/// The stored payload is re-parsed against its record type first, so a
/// corrupt or mismatched payload is rejected locally as a permanent error.
pub fn backend_row(
    session: &Session,
    source: &str,
    entry: &OutboxEntry,
) -> Result<serde_json::Value> {
    let data = RecordData::from_payload(entry.record_type, &entry.payload).map_err(|e| {
        HealthSyncError::invalid_request(format!(
            "Malformed {} payload for {}: {}",
            entry.record_type, entry.source_record_id, e
        ))
    })?;
    let fields = serde_json::from_str::<serde_json::Value>(&data.to_payload().map_err(|e| {
        HealthSyncError::invalid_request(format!("Unserializable payload: {}", e))
    })?)?;

    let mut row = match fields {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(HealthSyncError::invalid_request(
                "Record payload must be a JSON object",
            ))
        }
    };
    row.insert("user_id".to_string(), session.user_id.clone().into());
    row.insert("source".to_string(), source.into());
    row.insert(
        "date".to_string(),
        entry.record_date.format("%Y-%m-%d").to_string().into(),
    );
    row.insert(
        "source_record_id".to_string(),
        entry.source_record_id.clone().into(),
    );
    Ok(serde_json::Value::Object(row))
}

/// Client for the Supabase REST API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    source: String,
}

impl BackendClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[HealthSync] Backend response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[HealthSync] Backend response error ({}): {}", status, preview);
    }

    /// Create a new backend client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Supabase project URL (e.g., "https://xyz.supabase.co")
    /// * `api_key` - Project API key sent as the `apikey` header
    /// * `source` - Value written to the `source` column (e.g., "health_connect")
    pub fn new(base_url: &str, api_key: &str, source: &str) -> Result<Self> {
        Self::with_timeout(
            base_url,
            api_key,
            source,
            Duration::from_secs(HEALTH_SYNC_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Same as [`BackendClient::new`] with a custom per-request timeout.
    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        source: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            source: source.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| HealthSyncError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| HealthSyncError::invalid_request("Invalid API key format"))?;
        headers.insert("apikey", api_key);

        Ok(headers)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Turns a non-success response into an API error.
    async fn check_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if status.is_success() {
            return Ok(());
        }
        if let Ok(error) = serde_json::from_str::<PostgrestErrorResponse>(&body) {
            let summary = error.summary();
            if !summary.is_empty() {
                return Err(HealthSyncError::api(status.as_u16(), summary));
            }
        }
        Err(HealthSyncError::api(
            status.as_u16(),
            format!("Request failed: {}", body),
        ))
    }

    /// Upsert one row.
    ///
    /// POST /rest/v1/{table}?on_conflict=user_id,source,date
    pub async fn upsert_row(
        &self,
        session: &Session,
        table: &str,
        row: &serde_json::Value,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.table_url(table))
            .headers(self.headers(&session.access_token)?)
            .header("Prefer", UPSERT_PREFER)
            .query(&[("on_conflict", UPSERT_CONFLICT_TARGET)])
            .json(row)
            .send()
            .await?;
        Self::check_response(response).await
    }

    /// Delete the user's row for a source record.
    ///
    /// DELETE /rest/v1/{table}?user_id=eq.{user}&source_record_id=eq.{id}
    pub async fn delete_row(
        &self,
        session: &Session,
        table: &str,
        source_record_id: &str,
    ) -> Result<()> {
        let response = self
            .client
            .delete(self.table_url(table))
            .headers(self.headers(&session.access_token)?)
            .query(&[
                ("user_id", format!("eq.{}", session.user_id)),
                ("source_record_id", format!("eq.{}", source_record_id)),
            ])
            .send()
            .await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl HealthBackend for BackendClient {
    async fn upsert_record(&self, session: &Session, entry: &OutboxEntry) -> Result<()> {
        let row = backend_row(session, &self.source, entry)?;
        self.upsert_row(session, entry.record_type.backend_table(), &row)
            .await
    }

    async fn delete_record(&self, session: &Session, entry: &OutboxEntry) -> Result<()> {
        self.delete_row(
            session,
            entry.record_type.backend_table(),
            &entry.source_record_id,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    use migraineme_core::health::RecordType;
    use migraineme_core::sync::{OutboxOperation, OutboxStatus, SyncRetryClass};

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        headers: HashMap<String, String>,
        body: String,
    }

    fn session() -> Session {
        Session {
            access_token: "access-1".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    fn entry(record_type: RecordType, payload: &str) -> OutboxEntry {
        OutboxEntry {
            id: 7,
            source_record_id: "hc-7".to_string(),
            record_type,
            operation: OutboxOperation::Upsert,
            record_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            payload: payload.to_string(),
            created_at: "2026-03-01T06:00:00.000Z".to_string(),
            retry_count: 0,
            status: OutboxStatus::Pending,
            last_error: None,
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    async fn start_mock_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, Arc<TokioMutex<Vec<CapturedRequest>>>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let Some(request) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(request);
                let (status, body) = scripted
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or((500, r#"{"message":"unexpected request"}"#));
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.flush().await;
            }
        });

        (format!("http://{}", addr), captured)
    }

    #[test]
    fn backend_row_merges_identity_columns() {
        let row = backend_row(
            &session(),
            "health_connect",
            &entry(RecordType::RestingHr, r#"{"bpm":58.0}"#),
        )
        .expect("row");
        assert_eq!(row["user_id"], "user-1");
        assert_eq!(row["source"], "health_connect");
        assert_eq!(row["date"], "2026-03-01");
        assert_eq!(row["source_record_id"], "hc-7");
        assert_eq!(row["bpm"], 58.0);
    }

    #[test]
    fn malformed_payload_is_permanent() {
        let err = backend_row(
            &session(),
            "health_connect",
            &entry(RecordType::Hrv, r#"{"bpm":58.0}"#),
        )
        .unwrap_err();
        assert_eq!(err.retry_class(), SyncRetryClass::Permanent);
    }

    #[tokio::test]
    async fn upsert_sends_supabase_headers_and_conflict_target() {
        let (base_url, captured) = start_mock_server(vec![(201, "")]).await;
        let client = BackendClient::new(&base_url, "anon-key", "health_connect").expect("client");

        client
            .upsert_record(&session(), &entry(RecordType::Steps, r#"{"count":9000}"#))
            .await
            .expect("upsert");

        let requests = captured.lock().await;
        let request = &requests[0];
        assert!(request.request_line.starts_with("POST /rest/v1/steps_daily?on_conflict="));
        assert_eq!(request.headers.get("apikey").map(String::as_str), Some("anon-key"));
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer access-1")
        );
        assert_eq!(
            request.headers.get("prefer").map(String::as_str),
            Some(UPSERT_PREFER)
        );
        let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
        assert_eq!(body["count"], 9000);
    }

    #[tokio::test]
    async fn delete_filters_by_user_and_source_record() {
        let (base_url, captured) = start_mock_server(vec![(204, "")]).await;
        let client = BackendClient::new(&base_url, "anon-key", "health_connect").expect("client");
        let mut delete_entry = entry(RecordType::Weight, "{}");
        delete_entry.operation = OutboxOperation::Delete;

        client
            .delete_record(&session(), &delete_entry)
            .await
            .expect("delete");

        let requests = captured.lock().await;
        let line = &requests[0].request_line;
        assert!(line.starts_with("DELETE /rest/v1/weight_daily?"));
        assert!(line.contains("user_id=eq.user-1"));
        assert!(line.contains("source_record_id=eq.hc-7"));
    }

    #[tokio::test]
    async fn error_statuses_classify_per_taxonomy() {
        let (base_url, _captured) = start_mock_server(vec![
            (503, r#"{"message":"upstream unavailable"}"#),
            (400, r#"{"code":"22P02","message":"invalid input syntax"}"#),
            (401, r#"{"message":"JWT expired"}"#),
        ])
        .await;
        let client = BackendClient::new(&base_url, "anon-key", "health_connect").expect("client");
        let steps = entry(RecordType::Steps, r#"{"count":1}"#);

        let server_error = client.upsert_record(&session(), &steps).await.unwrap_err();
        assert_eq!(server_error.retry_class(), SyncRetryClass::Retryable);

        let client_error = client.upsert_record(&session(), &steps).await.unwrap_err();
        assert_eq!(client_error.retry_class(), SyncRetryClass::Permanent);
        assert!(client_error.to_string().contains("22P02"));

        let auth_error = client.upsert_record(&session(), &steps).await.unwrap_err();
        assert_eq!(auth_error.retry_class(), SyncRetryClass::ReauthRequired);
    }

    #[tokio::test]
    async fn unreachable_backend_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client =
            BackendClient::new(&format!("http://{}", addr), "anon-key", "health_connect")
                .expect("client");
        let err = client
            .upsert_record(&session(), &entry(RecordType::Steps, r#"{"count":1}"#))
            .await
            .unwrap_err();
        assert_eq!(err.retry_class(), SyncRetryClass::Retryable);
    }

    #[tokio::test]
    async fn silent_backend_times_out_as_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = BackendClient::with_timeout(
            &format!("http://{}", addr),
            "anon-key",
            "health_connect",
            Duration::from_millis(200),
        )
        .expect("client");
        let err = client
            .upsert_record(&session(), &entry(RecordType::Steps, r#"{"count":1}"#))
            .await
            .unwrap_err();
        assert!(matches!(&err, HealthSyncError::Http(e) if e.is_timeout()));
        assert_eq!(err.retry_class(), SyncRetryClass::Retryable);
    }
}
