//! Router tests over a SQLite-backed gateway.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sluice_common::config::GatewaySettings;
use sluice_common::{DataSourceConfig, SourcesConfig};
use sluice_runtime::{GatewayOptions, QueryGateway};
use sluice_server::{router, AppState};
use tower::ServiceExt;

const PUBLIC_URL: &str = "http://gw.test";

fn seed_db(rows: usize) -> anyhow::Result<tempfile::NamedTempFile> {
    let file = tempfile::NamedTempFile::new()?;
    let conn = rusqlite::Connection::open(file.path())?;
    conn.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL)", [])?;
    for i in 1..=rows {
        conn.execute(
            "INSERT INTO orders (id, total) VALUES (?1, ?2)",
            rusqlite::params![i as i64, i as f64 * 1.5],
        )?;
    }
    Ok(file)
}

fn app(db: &tempfile::NamedTempFile, worker_pool_size: usize) -> anyhow::Result<Router> {
    let sources = SourcesConfig {
        sources: vec![DataSourceConfig {
            id: "sales".to_string(),
            name: "Sales".to_string(),
            source_type: "sqlite".to_string(),
            catalog: "sales".to_string(),
            dialect: None,
            url: db.path().to_string_lossy().into_owned(),
            username: None,
            password: None,
            options: Value::Null,
        }],
    };
    let settings = GatewaySettings {
        worker_pool_size,
        ..Default::default()
    };
    let gateway = QueryGateway::new(GatewayOptions::new(settings, PUBLIC_URL, sources));
    Ok(router(AppState::new(Arc::new(gateway))?))
}

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    Ok((status, body))
}

fn submit(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    let path = uri.strip_prefix(PUBLIC_URL).unwrap_or(uri);
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_and_ready() -> anyhow::Result<()> {
    let db = seed_db(1)?;
    let app = app(&db, 3)?;

    let (status, body) = send(&app, get("/health")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, get("/ready")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacity"], 3);
    assert_eq!(body["live_queries"], 0);
    Ok(())
}

#[tokio::test]
async fn test_submit_and_follow_continuations() -> anyhow::Result<()> {
    let db = seed_db(25)?;
    let app = app(&db, 2)?;

    let (status, first) = send(
        &app,
        submit(json!({
            "sql": "SELECT id, total FROM sales.orders ORDER BY id",
            "type": 2,
            "data_source_id": "sales",
            "batch_size": 10
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["columns"][0]["name"], "id");
    assert_eq!(first["total_count"], 10);
    assert_eq!(first["entries"][0], json!([1, 1.5]));

    let mut next = first["next_uri"].as_str().map(str::to_string);
    let mut seen = 10;
    let mut pages = 1;
    while let Some(uri) = next {
        assert!(uri.starts_with(PUBLIC_URL));
        let (status, page) = send(&app, get(&uri)).await?;
        assert_eq!(status, StatusCode::OK);
        seen += page["entries"].as_array().map(|e| e.len()).unwrap_or(0);
        pages += 1;
        next = page["next_uri"].as_str().map(str::to_string);
    }
    assert_eq!(seen, 25);

    let (_, metrics) = send(&app, get("/metrics")).await?;
    let metrics = metrics.as_str().unwrap_or_default().to_string();
    assert!(metrics.contains("sluice_queries_submitted_total 1"));
    assert!(metrics.contains(&format!("sluice_pages_served_total {}", pages)));
    assert!(metrics.contains("sluice_live_queries 0"));
    Ok(())
}

#[tokio::test]
async fn test_client_errors_map_to_4xx() -> anyhow::Result<()> {
    let db = seed_db(30)?;
    let app = app(&db, 1)?;

    let (status, body) = send(&app, submit(json!({"sql": "SELECT 1", "type": 3}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SLUICE-2001");

    let (status, body) = send(
        &app,
        submit(json!({"sql": "SELECT 1", "type": 1, "data_source_id": "sales"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SLUICE-2003");
    assert!(body["trace_id"].is_string());

    let (status, body) = send(
        &app,
        submit(json!({"sql": "SELECT * FROM sales.orders", "type": 1, "data_source_id": "sale"})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SLUICE-2004");
    assert_eq!(body["hint"], "Did you mean 'sales'?");

    let (status, body) = send(&app, get("/v1/query/nope/y00/1")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SLUICE-2006");
    Ok(())
}

#[tokio::test]
async fn test_capacity_and_stale_token() -> anyhow::Result<()> {
    let db = seed_db(30)?;
    let app = app(&db, 1)?;
    let stream = json!({
        "sql": "SELECT id FROM sales.orders",
        "type": 2,
        "data_source_id": "sales",
        "batch_size": 10
    });

    let (status, first) = send(&app, submit(stream.clone())).await?;
    assert_eq!(status, StatusCode::OK);
    let next_uri = first["next_uri"].as_str().unwrap().to_string();

    let (status, body) = send(&app, submit(stream)).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "SLUICE-1001");
    assert_eq!(body["context"]["capacity"], 1);

    let stale = format!("{}/0", next_uri.strip_suffix("/1").unwrap());
    let (status, body) = send(&app, get(&stale)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SLUICE-2007");
    assert_eq!(body["context"]["expected"], 1);

    let (status, _) = send(&app, get(&next_uri)).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, metrics) = send(&app, get("/metrics")).await?;
    let metrics = metrics.as_str().unwrap_or_default().to_string();
    assert!(metrics.contains("sluice_queries_rejected_total 1"));
    assert!(metrics.contains("sluice_query_errors_total{category=\"client\"} 1"));
    assert!(metrics.contains("sluice_live_queries 1"));
    Ok(())
}
