//! SQL database connectors.
//!
//! Statements arrive already stripped of the gateway's source-qualifier and in
//! the source's native dialect; connectors execute them verbatim.
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use sluice_common::DataSourceConfig;

use crate::connector::Connector;
use crate::sources::ConnectorProvider;

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresConnector;
pub use sqlite::SqliteConnector;

/// Rows buffered between a driver thread and the async side.
pub const ROW_CHANNEL_CAPACITY: usize = 1024;

pub struct SqliteConnectorProvider;

#[async_trait]
impl ConnectorProvider for SqliteConnectorProvider {
    fn type_name(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(
        &self,
        source: &DataSourceConfig,
        _credential: Option<SecretString>,
    ) -> Result<Box<dyn Connector>> {
        Ok(Box::new(SqliteConnector::new(source.url.clone())))
    }
}

pub struct PostgresConnectorProvider;

#[async_trait]
impl ConnectorProvider for PostgresConnectorProvider {
    fn type_name(&self) -> &'static str {
        "postgres"
    }

    async fn connect(
        &self,
        source: &DataSourceConfig,
        credential: Option<SecretString>,
    ) -> Result<Box<dyn Connector>> {
        let connector = PostgresConnector::from_source(source, credential)
            .with_context(|| format!("Invalid PostgreSQL settings for source '{}'", source.id))?;
        Ok(Box::new(connector))
    }
}
