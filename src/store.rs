//! Record store access
//!
//! The backend owns all QA records; the core talks to it through the
//! `RecordStore` trait. `HttpRecordStore` is the production client with
//! timeout/retry handling; `MemoryStore` is a deterministic in-process
//! implementation used by tests and the CLI's offline mode.

use crate::record::{Record, RecordType};
use crate::submit::FinalForm;
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;
use parking_lot::RwLock;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Record store not configured")]
    NotConfigured,
    #[error("Authentication failed - check your API token")]
    AuthFailed,
    #[error("Rate limited - try again later")]
    RateLimited,
    #[error("Request timeout")]
    Timeout,
}

/// Query filters for `fetch_records`; unset filters match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordQuery {
    pub record_number: Option<i64>,
    pub ri_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub before_date: Option<NaiveDate>,
    pub after_date: Option<NaiveDate>,
}

impl RecordQuery {
    pub fn by_number(record_number: i64) -> Self {
        Self {
            record_number: Some(record_number),
            ..Self::default()
        }
    }

    pub fn for_ri(ri_id: impl Into<String>) -> Self {
        Self {
            ri_id: Some(ri_id.into()),
            ..Self::default()
        }
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn window(mut self, after: NaiveDate, before: NaiveDate) -> Self {
        self.after_date = Some(after);
        self.before_date = Some(before);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(n) = self.record_number {
            if record.record_number != n {
                return false;
            }
        }
        if let Some(ri) = &self.ri_id {
            if &record.ri_id != ri {
                return false;
            }
        }
        if let Some(d) = self.date {
            if record.record_date != d {
                return false;
            }
        }
        if let Some(before) = self.before_date {
            if record.record_date >= before {
                return false;
            }
        }
        if let Some(after) = self.after_date {
            if record.record_date < after {
                return false;
            }
        }
        true
    }
}

/// Raw user row as the store returns it; resolution to a `Reviewer`
/// (sentinels, admin override) happens in `users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreUser {
    pub qr_id: String,
    pub site_name: String,
    pub email: String,
}

/// Read/write contract against the record store.
///
/// `fetch_records` returns an empty list for an empty result, never an
/// error. `save_records` and `delete_records` return the IDs the store
/// actually accepted and must be idempotent under retry.
pub trait RecordStore {
    fn fetch_records(
        &self,
        record_type: RecordType,
        query: &RecordQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Record>, StoreError>> + Send;

    fn save_records(
        &self,
        record_type: RecordType,
        forms: &[FinalForm],
    ) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;

    fn delete_records(
        &self,
        record_type: RecordType,
        record_numbers: &[i64],
    ) -> impl std::future::Future<Output = Result<Vec<i64>, StoreError>> + Send;

    fn fetch_user(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<StoreUser, StoreError>> + Send;
}

/// Request tuning for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Number of retries for transient errors (default: 2)
    pub max_retries: u32,
    /// Retry delay in milliseconds (default: 1000)
    pub retry_delay_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

/// Connection settings for the record store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl StoreConfig {
    /// Read connection settings from `CALLAUDIT_BASE_URL`,
    /// `CALLAUDIT_EMAIL`, and `CALLAUDIT_API_TOKEN`.
    pub fn from_env() -> Result<Self, StoreError> {
        let var = |name: &str| std::env::var(name).map_err(|_| StoreError::NotConfigured);
        Ok(Self {
            base_url: var("CALLAUDIT_BASE_URL")?,
            email: var("CALLAUDIT_EMAIL")?,
            api_token: var("CALLAUDIT_API_TOKEN")?,
        })
    }
}

/// Credential buffer wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
struct SecureString(String);

impl SecureString {
    fn new(value: String) -> Self {
        Self(value)
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Deserialize)]
struct SaveResponse {
    saved: Vec<i64>,
}

#[derive(Deserialize)]
struct DeleteResponse {
    deleted: Vec<i64>,
}

/// HTTP record store client with secure token handling.
/// Auth credentials are zeroed when the client is dropped.
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
    auth_header: SecureString,
    config: RequestConfig,
}

impl HttpRecordStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_request_config(config, RequestConfig::default())
    }

    /// The api_token is immediately encoded and the intermediate cleared
    pub fn with_request_config(config: &StoreConfig, request: RequestConfig) -> Self {
        let mut auth = format!("{}:{}", config.email, config.api_token);
        let auth_header =
            SecureString::new(format!("Basic {}", general_purpose::STANDARD.encode(&auth)));
        auth.zeroize();

        let client = Client::builder()
            .timeout(Duration::from_secs(request.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header,
            config: request,
        }
    }

    fn records_url(&self, record_type: RecordType) -> String {
        format!("{}/api/qa/{}", self.base_url, record_type.path_segment())
    }

    fn query_params(query: &RecordQuery) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(n) = query.record_number {
            params.push(("record_number", n.to_string()));
        }
        if let Some(ri) = &query.ri_id {
            params.push(("ri_id", ri.clone()));
        }
        if let Some(d) = query.date {
            params.push(("date", d.to_string()));
        }
        if let Some(d) = query.before_date {
            params.push(("before_date", d.to_string()));
        }
        if let Some(d) = query.after_date {
            params.push(("after_date", d.to_string()));
        }
        params
    }

    /// Execute a request with retry logic for transient errors.
    /// Does NOT retry on auth errors (401/403).
    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(StoreError::AuthFailed);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(StoreError::RateLimited);
                    }
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.is_server_error() {
                        last_error = Some(StoreError::Api(format!("Server error: {}", status)));
                        if attempt < self.config.max_retries {
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_delay_ms * (u64::from(attempt) + 1),
                            ))
                            .await;
                            continue;
                        }
                    }

                    // Other client errors: fail immediately
                    let body = response.text().await.unwrap_or_default();
                    return Err(StoreError::Api(format!("HTTP {}: {}", status, body)));
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(StoreError::Timeout);
                    } else if e.is_connect() || e.is_request() {
                        last_error = Some(StoreError::Request(e));
                    } else {
                        return Err(StoreError::Request(e));
                    }

                    if attempt < self.config.max_retries {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (u64::from(attempt) + 1),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(StoreError::Api("Unknown error".to_string())))
    }
}

impl RecordStore for HttpRecordStore {
    async fn fetch_records(
        &self,
        record_type: RecordType,
        query: &RecordQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let url = self.records_url(record_type);
        let params = Self::query_params(query);

        let response = self
            .execute_with_retry(|| async {
                self.client
                    .get(&url)
                    .query(&params)
                    .header(header::AUTHORIZATION, self.auth_header.as_str())
                    .header(header::ACCEPT, "application/json")
                    .send()
                    .await
            })
            .await?;

        let records: Vec<Record> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(records)
    }

    async fn save_records(
        &self,
        record_type: RecordType,
        forms: &[FinalForm],
    ) -> Result<Vec<i64>, StoreError> {
        let url = format!("{}/save", self.records_url(record_type));

        let response = self
            .execute_with_retry(|| async {
                self.client
                    .post(&url)
                    .header(header::AUTHORIZATION, self.auth_header.as_str())
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ACCEPT, "application/json")
                    .json(forms)
                    .send()
                    .await
            })
            .await?;

        let parsed: SaveResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(parsed.saved)
    }

    async fn delete_records(
        &self,
        record_type: RecordType,
        record_numbers: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let url = format!("{}/delete", self.records_url(record_type));
        let body = serde_json::json!({ "record_numbers": record_numbers });

        let response = self
            .execute_with_retry(|| async {
                self.client
                    .post(&url)
                    .header(header::AUTHORIZATION, self.auth_header.as_str())
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ACCEPT, "application/json")
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        let parsed: DeleteResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(parsed.deleted)
    }

    async fn fetch_user(&self, email: &str) -> Result<StoreUser, StoreError> {
        let url = format!("{}/api/qa/users", self.base_url);

        let response = self
            .execute_with_retry(|| async {
                self.client
                    .get(&url)
                    .query(&[("email", email)])
                    .header(header::AUTHORIZATION, self.auth_header.as_str())
                    .header(header::ACCEPT, "application/json")
                    .send()
                    .await
            })
            .await?;

        response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<RecordType, Vec<Record>>,
    users: HashMap<String, StoreUser>,
    /// None accepts everything; Some restricts the accepted-ID set
    accept_saves: Option<HashSet<i64>>,
    accept_deletes: Option<HashSet<i64>>,
}

/// Deterministic in-process store for tests and offline report runs
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_records(&self, record_type: RecordType, records: Vec<Record>) {
        self.inner
            .write()
            .records
            .entry(record_type)
            .or_default()
            .extend(records);
    }

    pub fn seed_user(&self, user: StoreUser) {
        self.inner.write().users.insert(user.email.clone(), user);
    }

    /// Restrict which record numbers the store will accept on save
    pub fn accept_only_saves(&self, record_numbers: &[i64]) {
        self.inner.write().accept_saves = Some(record_numbers.iter().copied().collect());
    }

    /// Restrict which record numbers the store will accept on delete
    pub fn accept_only_deletes(&self, record_numbers: &[i64]) {
        self.inner.write().accept_deletes = Some(record_numbers.iter().copied().collect());
    }

    pub fn record_count(&self, record_type: RecordType) -> usize {
        self.inner
            .read()
            .records
            .get(&record_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl RecordStore for MemoryStore {
    async fn fetch_records(
        &self,
        record_type: RecordType,
        query: &RecordQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .records
            .get(&record_type)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| query.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_records(
        &self,
        record_type: RecordType,
        forms: &[FinalForm],
    ) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.inner.write();
        let mut accepted = Vec::new();

        for form in forms {
            let allowed = inner
                .accept_saves
                .as_ref()
                .map(|set| set.contains(&form.record_number))
                .unwrap_or(true);
            if !allowed {
                continue;
            }

            if let Some(records) = inner.records.get_mut(&record_type) {
                if let Some(record) = records
                    .iter_mut()
                    .find(|r| r.record_number == form.record_number)
                {
                    for (field, value) in &form.fields {
                        record.set_field(field, value.clone());
                    }
                }
            }
            accepted.push(form.record_number);
        }
        Ok(accepted)
    }

    async fn delete_records(
        &self,
        record_type: RecordType,
        record_numbers: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.inner.write();
        let mut accepted = Vec::new();

        for &number in record_numbers {
            let allowed = inner
                .accept_deletes
                .as_ref()
                .map(|set| set.contains(&number))
                .unwrap_or(true);
            if !allowed {
                continue;
            }

            if let Some(records) = inner.records.get_mut(&record_type) {
                records.retain(|r| r.record_number != number);
            }
            // deleting an already-absent record still reports the ID:
            // the contract is idempotent under retry
            accepted.push(number);
        }
        Ok(accepted)
    }

    async fn fetch_user(&self, email: &str) -> Result<StoreUser, StoreError> {
        let inner = self.inner.read();
        Ok(inner.users.get(email).cloned().unwrap_or(StoreUser {
            qr_id: String::new(),
            site_name: String::new(),
            email: email.to_string(),
        }))
    }
}
