use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use serde_json::Value;
use sluice_common::{Column, QueryType, Row};
use tokio::sync::{mpsc, oneshot};

use super::ROW_CHANNEL_CAPACITY;
use crate::connector::{Connector, ResultSet};

/// SQLite connector. Each result set runs on its own blocking thread with its
/// own connection; the thread stops as soon as the receiving side is dropped.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    db_path: String,
}

impl SqliteConnector {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let db_path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(&url)
            .to_string();
        Self { db_path }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn get_result_set(&mut self, sql: &str) -> Result<ResultSet> {
        let db_path = self.db_path.clone();
        let query = sql.to_string();
        let (meta_tx, meta_rx) = oneshot::channel::<Result<Vec<Column>>>();
        let (row_tx, row_rx) = mpsc::channel::<Result<Row>>(ROW_CHANNEL_CAPACITY);

        tracing::debug!(db = "[REDACTED]", "SQLite executing query");

        tokio::task::spawn_blocking(move || {
            let conn = match rusqlite::Connection::open(&db_path) {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = meta_tx.send(Err(e).context("Failed to open SQLite database"));
                    return;
                }
            };

            let mut stmt = match conn.prepare(&query) {
                Ok(stmt) => stmt,
                Err(e) => {
                    let _ = meta_tx.send(Err(e).context("Failed to prepare SQLite statement"));
                    return;
                }
            };

            let columns: Vec<Column> = stmt
                .columns()
                .iter()
                .map(|c| Column::new(c.name(), map_sqlite_type(c.decl_type())))
                .collect();
            let column_count = columns.len();

            let mut rows = match stmt.query([]) {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = meta_tx.send(Err(e).context("Failed to execute SQLite statement"));
                    return;
                }
            };

            if meta_tx.send(Ok(columns)).is_err() {
                return;
            }

            loop {
                let next = match rows.next() {
                    Ok(Some(row)) => (0..column_count)
                        .map(|i| row.get_ref(i).map(sqlite_value_to_json))
                        .collect::<rusqlite::Result<Row>>()
                        .context("Failed to decode SQLite row"),
                    Ok(None) => return,
                    Err(e) => Err(e).context("Failed to read SQLite row"),
                };
                let failed = next.is_err();
                if row_tx.blocking_send(next).is_err() || failed {
                    return;
                }
            }
        });

        let columns = meta_rx
            .await
            .context("SQLite worker exited before reporting columns")??;

        Ok(ResultSet::blocking(columns, row_rx))
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
        // Worker threads own their connections and exit when their receiver drops.
        Ok(())
    }
}

fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(v) => Value::String(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::String(v.iter().map(|b| format!("{:02x}", b)).collect()),
    }
}

/// Declared column type following SQLite's affinity rules; expressions have none.
fn map_sqlite_type(decl_type: Option<&str>) -> String {
    let Some(decl) = decl_type else {
        return "unknown".to_string();
    };
    let t = decl.to_uppercase();
    if t.contains("INT") {
        "integer"
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        "text"
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        "real"
    } else if t.contains("BLOB") || t.is_empty() {
        "blob"
    } else {
        "numeric"
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_prefix_stripped() {
        assert_eq!(SqliteConnector::new("sqlite:///tmp/a.db").db_path(), "/tmp/a.db");
        assert_eq!(SqliteConnector::new("sqlite:data.db").db_path(), "data.db");
        assert_eq!(SqliteConnector::new("/var/db.sqlite").db_path(), "/var/db.sqlite");
    }

    #[test]
    fn test_map_sqlite_types() {
        assert_eq!(map_sqlite_type(Some("INTEGER")), "integer");
        assert_eq!(map_sqlite_type(Some("varchar(20)")), "text");
        assert_eq!(map_sqlite_type(Some("DOUBLE")), "real");
        assert_eq!(map_sqlite_type(Some("DECIMAL(10,2)")), "numeric");
        assert_eq!(map_sqlite_type(None), "unknown");
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(sqlite_value_to_json(ValueRef::Integer(7)), Value::from(7));
        assert_eq!(
            sqlite_value_to_json(ValueRef::Text(b"abc")),
            Value::String("abc".into())
        );
        assert_eq!(
            sqlite_value_to_json(ValueRef::Blob(&[0xde, 0xad])),
            Value::String("dead".into())
        );
        assert_eq!(sqlite_value_to_json(ValueRef::Real(f64::NAN)), Value::Null);
    }
}
