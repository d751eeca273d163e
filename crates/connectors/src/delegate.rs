//! Delegate engine client.
//!
//! Statements the gateway cannot run against a single source are handed to an
//! external federated engine that speaks the Trino statement protocol:
//!
//! 1. `POST {endpoint}/v1/statement` with the SQL as body returns the first
//!    response and a `nextUri`.
//! 2. `GET nextUri` is repeated. Responses without `columns` are still queued;
//!    once columns appear each response may carry `data` rows.
//! 3. A response without `nextUri` is final. `DELETE nextUri` cancels.
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sluice_common::config::DelegateSettings;
use sluice_common::{Column, Row};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DelegateColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementStats {
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateError {
    pub message: String,
    #[serde(default)]
    pub error_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<DelegateColumn>>,
    #[serde(default)]
    pub data: Option<Vec<Row>>,
    #[serde(default)]
    pub stats: StatementStats,
    #[serde(default)]
    pub error: Option<DelegateError>,
}

impl StatementResponse {
    /// Still waiting for the engine to schedule the statement.
    pub fn is_queued(&self) -> bool {
        self.columns.is_none() && self.error.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.next_uri.is_none()
    }

    pub fn columns(&self) -> Option<Vec<Column>> {
        self.columns.as_ref().map(|cols| {
            cols.iter()
                .map(|c| Column::new(c.name.clone(), c.type_name.clone()))
                .collect()
        })
    }

    /// Turns an in-band `error` object into an `Err`.
    pub fn into_result(self) -> Result<Self> {
        if let Some(error) = &self.error {
            anyhow::bail!(
                "Delegate engine query {} failed ({}): {}",
                self.id,
                error.error_name.as_deref().unwrap_or("UNKNOWN"),
                error.message
            );
        }
        Ok(self)
    }
}

#[async_trait]
pub trait DelegateEngine: Send + Sync {
    async fn submit_statement(&self, sql: &str) -> Result<StatementResponse>;

    async fn poll(&self, next_uri: &str) -> Result<StatementResponse>;

    async fn cancel(&self, next_uri: &str) -> Result<()>;
}

pub struct HttpDelegateClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDelegateClient {
    pub fn new(settings: &DelegateSettings) -> Result<Self> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        // X-Trino-User -> X-Trino-Catalog / X-Trino-Schema
        let prefix = settings
            .user_header
            .strip_suffix("User")
            .unwrap_or("X-Trino-")
            .to_string();

        let mut headers = HeaderMap::new();
        let mut insert = |name: &str, value: &str| -> Result<()> {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("Invalid delegate header name: {}", name))?,
                HeaderValue::from_str(value)
                    .with_context(|| format!("Invalid value for delegate header {}", name))?,
            );
            Ok(())
        };

        insert(&settings.user_header, &settings.user)?;
        if let Some(catalog) = &settings.catalog {
            insert(&format!("{}Catalog", prefix), catalog)?;
        }
        if let Some(schema) = &settings.schema {
            insert(&format!("{}Schema", prefix), schema)?;
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build delegate HTTP client")?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn read_response(resp: reqwest::Response) -> Result<StatementResponse> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Delegate engine returned {}: {}", status, body);
        }
        let parsed: StatementResponse = resp
            .json()
            .await
            .context("Failed to decode delegate engine response")?;
        parsed.into_result()
    }
}

#[async_trait]
impl DelegateEngine for HttpDelegateClient {
    async fn submit_statement(&self, sql: &str) -> Result<StatementResponse> {
        let resp = self
            .client
            .post(format!("{}/v1/statement", self.endpoint))
            .body(sql.to_string())
            .send()
            .await
            .context("Failed to submit statement to delegate engine")?;
        Self::read_response(resp).await
    }

    async fn poll(&self, next_uri: &str) -> Result<StatementResponse> {
        let resp = self
            .client
            .get(next_uri)
            .send()
            .await
            .context("Failed to poll delegate engine")?;
        Self::read_response(resp).await
    }

    async fn cancel(&self, next_uri: &str) -> Result<()> {
        let resp = self
            .client
            .delete(next_uri)
            .send()
            .await
            .context("Failed to cancel delegate engine query")?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "Delegate engine rejected cancel");
        }
        Ok(())
    }
}
