pub use crate::models::{DataSourceConfig, SourcesConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use validator::Validate;

// Default constants
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
pub const DEFAULT_SERVER_NAME: &str = "Sluice Gateway";

pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;
pub const DEFAULT_RESULT_BUFFER_CAPACITY: usize = 16;
pub const DEFAULT_MAX_RUN_TIME_SECS: u64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CLIENT_DIALECT: &str = "generic";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_DELEGATE_USER: &str = "sluice";
pub const DEFAULT_DELEGATE_USER_HEADER: &str = "X-Trino-User";
pub const DEFAULT_DELEGATE_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_TELEMETRY_ENABLED: bool = false;
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,
    #[serde(default)]
    #[validate(nested)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    #[validate(nested)]
    pub delegate: Option<DelegateSettings>,
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL clients use to reach this gateway; continuation URIs are built on it.
    #[serde(default = "default_public_url")]
    #[validate(custom(function = "validate_public_url"))]
    pub public_url: String,

    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_url: default_public_url(),
            name: default_server_name(),
        }
    }
}

/// Capacity and paging limits for the query gateway.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct GatewaySettings {
    /// Upper bound on concurrently live queries and on concurrent producers.
    #[serde(default = "default_worker_pool_size")]
    #[validate(range(min = 1))]
    pub worker_pool_size: usize,

    /// Maximum number of pages buffered per query before the producer pauses.
    #[serde(default = "default_result_buffer_capacity")]
    #[validate(range(min = 1))]
    pub result_buffer_capacity: usize,

    #[serde(default = "default_max_run_time_secs")]
    #[validate(range(min = 1))]
    pub max_run_time_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,

    /// Rows requested from a connector per fetch.
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1))]
    pub page_size: usize,

    /// Dialect client statements are written in.
    #[serde(default = "default_client_dialect")]
    pub client_dialect: String,

    /// Response timeout for streaming continuation requests that omit `timeout`.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            result_buffer_capacity: default_result_buffer_capacity(),
            max_run_time_secs: default_max_run_time_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            page_size: default_page_size(),
            client_dialect: default_client_dialect(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

/// External federated engine used as the last fallback tier.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct DelegateSettings {
    #[validate(url)]
    pub endpoint: String,
    #[serde(default = "default_delegate_user")]
    pub user: String,
    #[serde(default = "default_delegate_user_header")]
    pub user_header: String,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_delegate_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_otlp_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[serde(default = "default_service_name_config")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            endpoint: default_otlp_endpoint(),
            service_name: default_service_name_config(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    /// Write `queries` and `errors` targets to daily JSON files.
    #[serde(default = "default_json_files")]
    pub json_files: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            json_files: default_json_files(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_public_url() -> String {
    DEFAULT_PUBLIC_URL.to_string()
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_worker_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

fn default_result_buffer_capacity() -> usize {
    DEFAULT_RESULT_BUFFER_CAPACITY
}

fn default_max_run_time_secs() -> u64 {
    DEFAULT_MAX_RUN_TIME_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_client_dialect() -> String {
    DEFAULT_CLIENT_DIALECT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_delegate_user() -> String {
    DEFAULT_DELEGATE_USER.to_string()
}

fn default_delegate_user_header() -> String {
    DEFAULT_DELEGATE_USER_HEADER.to_string()
}

fn default_delegate_timeout_secs() -> u64 {
    DEFAULT_DELEGATE_TIMEOUT_SECS
}

fn default_telemetry_enabled() -> bool {
    DEFAULT_TELEMETRY_ENABLED
}

fn default_otlp_endpoint() -> String {
    DEFAULT_OTLP_ENDPOINT.to_string()
}

fn default_service_name_config() -> String {
    "sluice".to_string()
}

fn default_log_directory() -> String {
    DEFAULT_LOG_DIRECTORY.to_string()
}

fn default_json_files() -> bool {
    true
}

fn validate_public_url(url: &str) -> Result<(), validator::ValidationError> {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_public_url")),
    }
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        // SLUICE__GATEWAY__WORKER_POOL_SIZE maps to gateway.worker_pool_size
        let builder = builder.add_source(
            config::Environment::with_prefix("SLUICE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }
}

impl SourcesConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        let cfg = builder
            .build()
            .context("Failed to build sources configuration")?;

        let sources: SourcesConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize sources configuration")?;

        for source in &sources.sources {
            source
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid data source '{}': {:?}", source.id, e))?;
        }

        let mut seen = std::collections::HashSet::new();
        for source in &sources.sources {
            if !seen.insert(source.id.as_str()) {
                anyhow::bail!("Duplicate data source id: {}", source.id);
            }
        }

        Ok(sources)
    }
}
