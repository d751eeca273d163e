//! Connector providers.
//!
//! Each source type is served by a `ConnectorProvider`. The registry picks the
//! provider by the `type` field of a data source and opens a fresh
//! [`Connector`](crate::Connector) for every execution attempt.
//!
//! # Supported Sources
//!
//! | Source Type | Provider | Driver |
//! |-------------|----------|--------|
//! | `sqlite`    | `SqliteConnectorProvider` | `rusqlite` on a blocking thread |
//! | `postgres`  | `PostgresConnectorProvider` | `tokio-postgres` row stream |
//!
//! # Adding a New Source
//!
//! 1. Implement `Connector` for the driver.
//! 2. Implement `ConnectorProvider::connect` to build it from a `DataSourceConfig`.
//! 3. Register the provider in `default_registry`.
//!
//! An unregistered type is an error from `ConnectorRegistry::connect`, which the
//! gateway treats as a reason to try the next execution tier.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use sluice_common::DataSourceConfig;
use sluice_error::{ErrorCode, SluiceError};
use std::collections::HashMap;

use crate::connector::Connector;

pub mod sql;

#[async_trait]
pub trait ConnectorProvider: Send + Sync {
    /// Source type this provider handles (e.g., "sqlite", "postgres")
    fn type_name(&self) -> &'static str;

    /// Opens a connector for `source`. `credential` is already decrypted.
    async fn connect(
        &self,
        source: &DataSourceConfig,
        credential: Option<SecretString>,
    ) -> Result<Box<dyn Connector>>;
}

#[derive(Default)]
pub struct ConnectorRegistry {
    providers: HashMap<&'static str, Box<dyn ConnectorProvider>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Box<dyn ConnectorProvider>) {
        self.providers.insert(provider.type_name(), provider);
    }

    fn canonical_type(source_type: &str) -> String {
        match source_type.to_lowercase().as_str() {
            "postgresql" | "pg" => "postgres".to_string(),
            "sqlite3" => "sqlite".to_string(),
            other => other.to_string(),
        }
    }

    pub fn supports(&self, source_type: &str) -> bool {
        self.providers
            .contains_key(Self::canonical_type(source_type).as_str())
    }

    pub async fn connect(
        &self,
        source: &DataSourceConfig,
        credential: Option<SecretString>,
    ) -> Result<Box<dyn Connector>> {
        let type_name = Self::canonical_type(&source.source_type);

        if let Some(provider) = self.providers.get(type_name.as_str()) {
            provider.connect(source, credential).await
        } else {
            let mut known: Vec<_> = self.providers.keys().copied().collect();
            known.sort_unstable();
            Err(SluiceError::new(
                ErrorCode::UnsupportedSourceType,
                format!("No provider found for source type: {}", type_name),
            )
            .with_hint(format!("Supported source types: {}", known.join(", ")))
            .into())
        }
    }
}

pub fn default_registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new();
    registry.register_provider(Box::new(sql::SqliteConnectorProvider));
    registry.register_provider(Box::new(sql::PostgresConnectorProvider));
    registry
}
