//! The gateway over real collaborators: SQLite files and an HTTP delegate engine.

mod common;

use serde_json::json;
use sluice_common::config::{AppConfig, DelegateSettings};
use sluice_common::{DataSourceConfig, QueryRequest, QueryType, SourcesConfig};
use sluice_error::ErrorCode;
use sluice_runtime::{GatewayOptions, QueryGateway};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn seed_db(rows: usize) -> anyhow::Result<tempfile::NamedTempFile> {
    let file = tempfile::NamedTempFile::new()?;
    let conn = rusqlite::Connection::open(file.path())?;
    conn.execute("CREATE TABLE t1 (id INTEGER PRIMARY KEY, name TEXT)", [])?;
    for i in 1..=rows {
        conn.execute(
            "INSERT INTO t1 (id, name) VALUES (?1, ?2)",
            rusqlite::params![i as i64, format!("row-{}", i)],
        )?;
    }
    Ok(file)
}

fn sqlite_sources(db: &tempfile::NamedTempFile) -> SourcesConfig {
    SourcesConfig {
        sources: vec![DataSourceConfig {
            id: "local".to_string(),
            name: "Local file".to_string(),
            source_type: "sqlite".to_string(),
            catalog: "local".to_string(),
            dialect: None,
            url: db.path().to_string_lossy().into_owned(),
            username: None,
            password: None,
            options: serde_json::Value::Null,
        }],
    }
}

fn local_request(sql: &str, query_type: QueryType, batch_size: usize) -> QueryRequest {
    QueryRequest {
        sql: sql.to_string(),
        query_type,
        data_source_id: "local".to_string(),
        batch_size,
        timeout: 0,
    }
}

fn sqlite_gateway(db: &tempfile::NamedTempFile) -> QueryGateway {
    QueryGateway::new(GatewayOptions::new(
        common::settings(2),
        common::PUBLIC_URL,
        sqlite_sources(db),
    ))
}

#[tokio::test]
async fn test_sqlite_stream_end_to_end() -> anyhow::Result<()> {
    let db = seed_db(25)?;
    let gateway = sqlite_gateway(&db);

    let first = gateway
        .submit(local_request(
            "SELECT id, name FROM local.t1 ORDER BY id",
            QueryType::Stream,
            10,
        ))
        .await?;
    assert_eq!(first.columns[0].name, "id");
    assert_eq!(first.columns[1].name, "name");

    let (rows, _) = common::drain(&gateway, first, None).await?;
    let expected: Vec<_> = (1..=25)
        .map(|i| vec![json!(i), json!(format!("row-{}", i))])
        .collect();
    assert_eq!(rows, expected);
    assert_eq!(gateway.live_queries(), 0);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_sync_is_capped() -> anyhow::Result<()> {
    let db = seed_db(40)?;
    let gateway = sqlite_gateway(&db);

    let first = gateway
        .submit(local_request(
            "SELECT name FROM local.t1 WHERE id > 30 ORDER BY id;",
            QueryType::Sync,
            25,
        ))
        .await?;
    assert_eq!(first.total_count, 10);
    assert_eq!(first.entries[0], vec![json!("row-31")]);
    assert!(first.next_uri.is_none());

    // LIMIT fills the page exactly: one response, no trailing empty page.
    let capped = gateway
        .submit(local_request("SELECT id FROM local.t1", QueryType::Sync, 7))
        .await?;
    assert_eq!(capped.total_count, 7);
    assert!(capped.next_uri.is_none());
    assert_eq!(gateway.live_queries(), 0);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_missing_table_exhausts_fallback() -> anyhow::Result<()> {
    let db = seed_db(1)?;
    let gateway = sqlite_gateway(&db);

    let err = gateway
        .submit(local_request(
            "SELECT * FROM local.missing",
            QueryType::Stream,
            10,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FallbackExhausted);
    assert!(err.message.contains("No delegate engine configured"));
    assert!(err.to_json().contains("no such table"));
    assert_eq!(gateway.live_queries(), 0);
    Ok(())
}

#[tokio::test]
async fn test_http_delegate_end_to_end() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let base = server.uri();
    let sql = "SELECT t1.id, t2.label FROM local.t1 JOIN warehouse.t2 ON t1.id = t2.id";

    Mock::given(method("POST"))
        .and(path("/v1/statement"))
        .and(header("X-Trino-User", "sluice"))
        .and(body_string(sql))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "d1",
            "nextUri": format!("{}/v1/statement/queued/d1/1", base),
            "stats": {"state": "QUEUED"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/statement/queued/d1/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "d1",
            "nextUri": format!("{}/v1/statement/executing/d1/2", base),
            "columns": [{"name": "id", "type": "bigint"}, {"name": "label", "type": "varchar"}],
            "data": [[1, "a"], [2, "b"]],
            "stats": {"state": "RUNNING"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/statement/executing/d1/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "d1",
            "columns": [{"name": "id", "type": "bigint"}, {"name": "label", "type": "varchar"}],
            "data": [[3, "c"]],
            "stats": {"state": "FINISHED"}
        })))
        .mount(&server)
        .await;

    let db = seed_db(1)?;
    let config = AppConfig {
        delegate: Some(DelegateSettings {
            endpoint: base.clone(),
            user: "sluice".to_string(),
            user_header: "X-Trino-User".to_string(),
            catalog: None,
            schema: None,
            request_timeout_secs: 5,
        }),
        ..Default::default()
    };
    let gateway = QueryGateway::new(GatewayOptions::from_config(&config, sqlite_sources(&db))?);

    let page = gateway
        .submit(local_request(sql, QueryType::Stream, 10))
        .await?;
    assert_eq!(page.columns[1].name, "label");
    assert_eq!(page.columns[1].data_type, "varchar");
    assert_eq!(
        page.entries,
        vec![
            vec![json!(1), json!("a")],
            vec![json!(2), json!("b")],
            vec![json!(3), json!("c")],
        ]
    );
    assert!(page.next_uri.is_none());
    assert_eq!(gateway.live_queries(), 0);
    Ok(())
}
