//! Instrumented collaborators for gateway tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use secrecy::SecretString;
use serde_json::json;
use sluice_common::config::GatewaySettings;
use sluice_common::{Column, DataSourceConfig, QueryRequest, QueryType, Row, SourcesConfig};
use sluice_connectors::{
    Connector, ConnectorProvider, DelegateEngine, ResultSet, StatementResponse,
};
use sluice_error::{ErrorCode, SluiceError};
use sluice_runtime::{GatewayOptions, QueryGateway};
use sluice_sql::Transpiler;

pub const PUBLIC_URL: &str = "http://gw.test";

/// What the mock connector does. Shared by every connector it opens.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    pub rows: usize,
    /// `get_result_set` fails unless the statement contains this marker.
    pub accept_only: Option<String>,
    pub fail_on_page: Option<usize>,
    pub panic_on_page: Option<usize>,
    /// Page index and how long fetching it takes.
    pub stall_on_page: Option<(usize, Duration)>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub behavior: Mutex<MockBehavior>,
    pub connects: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockState {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            ..Default::default()
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

pub struct MockConnectorProvider {
    state: Arc<MockState>,
}

impl MockConnectorProvider {
    pub fn new(state: Arc<MockState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ConnectorProvider for MockConnectorProvider {
    fn type_name(&self) -> &'static str {
        "mock"
    }

    async fn connect(
        &self,
        _source: &DataSourceConfig,
        _credential: Option<SecretString>,
    ) -> anyhow::Result<Box<dyn Connector>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnector {
            state: self.state.clone(),
            page: 0,
        }))
    }
}

struct MockConnector {
    state: Arc<MockState>,
    page: usize,
}

/// Counts a `get_data` call as active until it returns or is dropped.
struct ActiveCall<'a>(&'a MockState);

impl<'a> ActiveCall<'a> {
    fn enter(state: &'a MockState) -> Self {
        let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(active, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn mock_row(i: usize) -> Row {
    vec![json!(i), json!(format!("row-{}", i))]
}

#[async_trait]
impl Connector for MockConnector {
    async fn get_result_set(&mut self, sql: &str) -> anyhow::Result<ResultSet> {
        self.state.executed.lock().push(sql.to_string());
        let behavior = self.state.behavior.lock().clone();

        if let Some(marker) = &behavior.accept_only {
            if !sql.contains(marker.as_str()) {
                anyhow::bail!("mock source rejected statement: {}", sql);
            }
        }

        let rows = futures::stream::iter((1..=behavior.rows).map(|i| Ok(mock_row(i)))).boxed();
        Ok(ResultSet::stream(
            vec![Column::new("id", "integer"), Column::new("name", "text")],
            rows,
        ))
    }

    async fn get_data(
        &mut self,
        result_set: ResultSet,
        column_count: usize,
        _query_type: QueryType,
        page_size: usize,
    ) -> anyhow::Result<(Option<ResultSet>, Vec<Row>)> {
        let _active = ActiveCall::enter(&self.state);

        let page = self.page;
        self.page += 1;
        let behavior = self.state.behavior.lock().clone();

        let outcome = async {
            if let Some((at, delay)) = behavior.stall_on_page {
                if at == page {
                    tokio::time::sleep(delay).await;
                }
            }
            if behavior.panic_on_page == Some(page) {
                panic!("mock connector blew up on page {}", page);
            }
            if behavior.fail_on_page == Some(page) {
                anyhow::bail!("mock connector lost its connection on page {}", page);
            }
            tokio::task::yield_now().await;
            result_set.next_page(column_count, page_size).await
        }
        .await;
        outcome
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Succeeds by prefixing a marker, or always fails.
pub struct MockTranspiler {
    succeed: bool,
    pub calls: AtomicUsize,
}

pub const TRANSPILED_MARKER: &str = "/* native */";

impl MockTranspiler {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            succeed: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            succeed: false,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Transpiler for MockTranspiler {
    fn transpile(&self, sql: &str, _from: &str, to: &str) -> sluice_error::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(format!("{} {}", TRANSPILED_MARKER, sql))
        } else {
            Err(SluiceError::new(
                ErrorCode::TranspileFailed,
                format!("cannot translate to {}", to),
            ))
        }
    }
}

/// Delegate engine that queues once, then returns `rows` in one response.
pub struct MockDelegate {
    rows: usize,
    fail_submit: bool,
    pub submits: AtomicUsize,
    pub cancels: AtomicUsize,
    pub statements: Mutex<Vec<String>>,
}

impl MockDelegate {
    pub fn new(rows: usize) -> Arc<Self> {
        Arc::new(Self {
            rows,
            fail_submit: false,
            submits: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: 0,
            fail_submit: true,
            submits: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelegateEngine for MockDelegate {
    async fn submit_statement(&self, sql: &str) -> anyhow::Result<StatementResponse> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().push(sql.to_string());
        if self.fail_submit {
            anyhow::bail!("delegate engine is down");
        }
        Ok(StatementResponse {
            id: "delegate_1".to_string(),
            next_uri: Some("mock://delegate/queued/1".to_string()),
            ..Default::default()
        })
    }

    async fn poll(&self, next_uri: &str) -> anyhow::Result<StatementResponse> {
        match next_uri {
            "mock://delegate/queued/1" => Ok(serde_json::from_value(json!({
                "id": "delegate_1",
                "columns": [{"name": "id", "type": "integer"}, {"name": "name", "type": "text"}],
                "data": (1..=self.rows).map(mock_row).collect::<Vec<_>>(),
                "stats": {"state": "FINISHED"}
            }))?),
            other => anyhow::bail!("unexpected poll of {}", other),
        }
    }

    async fn cancel(&self, _next_uri: &str) -> anyhow::Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn mock_source() -> DataSourceConfig {
    DataSourceConfig {
        id: "ds1".to_string(),
        name: "Mock".to_string(),
        source_type: "mock".to_string(),
        catalog: "cat1".to_string(),
        dialect: Some("postgres".to_string()),
        url: "mock://".to_string(),
        username: None,
        password: None,
        options: serde_json::Value::Null,
    }
}

pub fn settings(worker_pool_size: usize) -> GatewaySettings {
    GatewaySettings {
        worker_pool_size,
        result_buffer_capacity: 4,
        ..Default::default()
    }
}

pub fn options(settings: GatewaySettings, state: &Arc<MockState>) -> GatewayOptions {
    GatewayOptions::new(
        settings,
        PUBLIC_URL,
        SourcesConfig {
            sources: vec![mock_source()],
        },
    )
    .with_connector_provider(Box::new(MockConnectorProvider::new(state.clone())))
}

pub fn gateway(settings: GatewaySettings, state: &Arc<MockState>) -> QueryGateway {
    QueryGateway::new(options(settings, state))
}

/// Splits a continuation URI into `(query_id, slug, token)`.
pub fn continuation(next_uri: &str) -> (String, String, u64) {
    let parsed = sluice_runtime::ContinuationUri::parse(next_uri).expect("continuation uri");
    (parsed.query_id, parsed.slug, parsed.token)
}

pub fn request(sql: &str, query_type: QueryType, batch_size: usize, timeout: u64) -> QueryRequest {
    QueryRequest {
        sql: sql.to_string(),
        query_type,
        data_source_id: "ds1".to_string(),
        batch_size,
        timeout,
    }
}

/// Follows continuations until the result is exhausted, returning every row
/// and the tokens that were presented.
pub async fn drain(
    gateway: &QueryGateway,
    first: sluice_common::QueryResponse,
    timeout: Option<u64>,
) -> anyhow::Result<(Vec<Row>, Vec<u64>)> {
    let mut rows = first.entries;
    let mut tokens = Vec::new();
    let mut next = first.next_uri;

    while let Some(uri) = next {
        let (query_id, slug, token) = continuation(&uri);
        tokens.push(token);
        let page = gateway
            .fetch_next(&query_id, &slug, token, None, timeout)
            .await?;
        rows.extend(page.entries);
        next = page.next_uri;
    }
    Ok((rows, tokens))
}
