use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sluice_common::{Column, DataSourceConfig, QueryType, Row};
use std::str::FromStr;
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls};

use crate::connector::{Connector, ResultSet};

/// PostgreSQL connector. Connects lazily on the first statement and streams
/// rows with `query_raw`, so only one page is materialised at a time.
pub struct PostgresConnector {
    config: Config,
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PostgresConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("connected", &self.client.is_some())
            .finish()
    }
}

impl PostgresConnector {
    pub fn from_source(source: &DataSourceConfig, credential: Option<SecretString>) -> Result<Self> {
        let mut config =
            Config::from_str(&source.url).context("Failed to parse PostgreSQL connection string")?;
        if let Some(user) = &source.username {
            config.user(user);
        }
        if let Some(password) = credential {
            config.password(password.expose_secret());
        }
        Ok(Self {
            config,
            client: None,
            connection: None,
        })
    }

    async fn client(&mut self) -> Result<&Client> {
        if self.client.is_none() {
            let (client, connection) = self
                .config
                .connect(NoTls)
                .await
                .context("Failed to connect to PostgreSQL")?;

            self.connection = Some(tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(target: "errors", "PostgreSQL connection error: {}", e);
                }
            }));
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .context("PostgreSQL client unavailable")
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn get_result_set(&mut self, sql: &str) -> Result<ResultSet> {
        let client = self.client().await?;

        let statement = client
            .prepare(sql)
            .await
            .context("Failed to prepare PostgreSQL statement")?;

        let columns: Vec<Column> = statement
            .columns()
            .iter()
            .map(|c| Column::new(c.name(), c.type_().name()))
            .collect();
        let types: Vec<Type> = statement
            .columns()
            .iter()
            .map(|c| c.type_().clone())
            .collect();

        let stream = client
            .query_raw(&statement, std::iter::empty::<&(dyn ToSql + Sync)>())
            .await
            .context("Failed to execute PostgreSQL statement")?;

        let rows = stream
            .map(move |row| {
                let row = row.context("Failed to read PostgreSQL row")?;
                types
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| pg_value_to_json(&row, i, ty))
                    .collect::<Result<Row>>()
            })
            .boxed();

        Ok(ResultSet::stream(columns, rows))
    }

    async fn get_data(
        &mut self,
        result_set: ResultSet,
        column_count: usize,
        _query_type: QueryType,
        page_size: usize,
    ) -> Result<(Option<ResultSet>, Vec<Row>)> {
        result_set.next_page(column_count, page_size).await
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        Ok(())
    }
}

impl Drop for PostgresConnector {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }
}

fn pg_value_to_json(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::from),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .and_then(|v| serde_json::Number::from_f64(v as f64).map(Value::Number)),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)?
            .and_then(|v| serde_json::Number::from_f64(v).map(Value::Number)),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?,
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(|v| Value::String(v.to_string())),
        Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map(|v| Value::String(v.to_string())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|v| Value::String(v.to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|v| Value::String(v.to_rfc3339())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::String)
        }
        _ => {
            tracing::debug!(
                "PostgreSQL type '{}' has no JSON mapping, returning null",
                ty.name()
            );
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
