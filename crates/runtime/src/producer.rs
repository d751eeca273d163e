//! Producers drain a connector or delegate-engine result into a cache entry.
//!
//! Exactly one producer runs per entry, inside one worker-pool slot. It fetches
//! columns once, then alternates fetching a page and waiting for the unread
//! rows to drop below what the current waiter asked for. Any error, including
//! a panic, is stored on the entry for the next waiter; the source is closed on
//! every exit path. Removing the entry interrupts a fetch in flight, so an
//! evicted query gives its pool slot back even if its source never answers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use sluice_common::telemetry::ERRORS_TARGET;
use sluice_common::{Column, QueryType, Row};
use sluice_connectors::{Connector, DelegateEngine, ResultSet, StatementResponse};
use sluice_error::{ErrorCode, SluiceError};

use crate::cache::ProducerHandle;

/// One fetch from a page source.
#[derive(Debug, Default)]
pub struct PageFetch {
    pub rows: Vec<Row>,
    /// No further fetch will return rows.
    pub exhausted: bool,
}

/// A result being streamed out of a connector or the delegate engine.
#[async_trait]
pub trait PageSource: Send {
    /// Error code stored when this source fails.
    fn failure_code(&self) -> ErrorCode;

    async fn columns(&mut self) -> anyhow::Result<Vec<Column>>;

    async fn next_page(&mut self, page_size: usize) -> anyhow::Result<PageFetch>;

    /// Releases whatever the source still holds. Called once, on every exit path.
    async fn close(&mut self);
}

/// Pages out of an open connector result set.
pub struct ConnectorSource {
    connector: Box<dyn Connector>,
    result_set: Option<ResultSet>,
    column_count: usize,
    query_type: QueryType,
}

impl ConnectorSource {
    pub fn new(connector: Box<dyn Connector>, result_set: ResultSet, query_type: QueryType) -> Self {
        let column_count = result_set.columns().len();
        Self {
            connector,
            result_set: Some(result_set),
            column_count,
            query_type,
        }
    }
}

#[async_trait]
impl PageSource for ConnectorSource {
    fn failure_code(&self) -> ErrorCode {
        ErrorCode::ConnectorFailed
    }

    async fn columns(&mut self) -> anyhow::Result<Vec<Column>> {
        let result_set = self
            .result_set
            .as_ref()
            .context("Result set already consumed")?;
        let columns = self.connector.get_columns(result_set)?;
        self.column_count = columns.len();
        Ok(columns)
    }

    async fn next_page(&mut self, page_size: usize) -> anyhow::Result<PageFetch> {
        let Some(result_set) = self.result_set.take() else {
            return Ok(PageFetch {
                rows: vec![],
                exhausted: true,
            });
        };

        let (next, rows) = self
            .connector
            .get_data(result_set, self.column_count, self.query_type, page_size)
            .await?;
        self.result_set = next;

        Ok(PageFetch {
            rows,
            exhausted: self.result_set.is_none(),
        })
    }

    async fn close(&mut self) {
        self.result_set = None;
        if let Err(e) = self.connector.close().await {
            tracing::warn!("Failed to close connector: {:#}", e);
        }
    }
}

/// Pages out of a statement running on the delegate engine.
///
/// Starts from the submit response. The queued phase is polled through while
/// fetching columns; data that arrives alongside the columns is kept for the
/// first page.
pub struct DelegateSource {
    engine: Arc<dyn DelegateEngine>,
    current: Option<StatementResponse>,
    next_uri: Option<String>,
    pending: Vec<Row>,
}

impl DelegateSource {
    pub fn new(engine: Arc<dyn DelegateEngine>, submitted: StatementResponse) -> Self {
        Self {
            engine,
            next_uri: submitted.next_uri.clone(),
            current: Some(submitted),
            pending: Vec::new(),
        }
    }

    fn accept(&mut self, response: StatementResponse) {
        self.next_uri = response.next_uri;
        if let Some(data) = response.data {
            self.pending.extend(data);
        }
    }
}

#[async_trait]
impl PageSource for DelegateSource {
    fn failure_code(&self) -> ErrorCode {
        ErrorCode::DelegateFailed
    }

    async fn columns(&mut self) -> anyhow::Result<Vec<Column>> {
        let mut response = self
            .current
            .take()
            .context("Delegate statement already started")?;

        while response.is_queued() {
            let Some(uri) = response.next_uri.clone() else {
                break;
            };
            self.next_uri = Some(uri.clone());
            response = self.engine.poll(&uri).await?;
        }

        let columns = response.columns().unwrap_or_default();
        tracing::debug!(
            delegate_query_id = %response.id,
            state = %response.stats.state,
            columns = columns.len(),
            "Delegate statement executing"
        );
        self.accept(response);
        Ok(columns)
    }

    async fn next_page(&mut self, _page_size: usize) -> anyhow::Result<PageFetch> {
        while self.pending.is_empty() {
            let Some(uri) = self.next_uri.clone() else {
                break;
            };
            let response = self.engine.poll(&uri).await?;
            self.accept(response);
        }

        Ok(PageFetch {
            rows: std::mem::take(&mut self.pending),
            exhausted: self.next_uri.is_none(),
        })
    }

    async fn close(&mut self) {
        if let Some(uri) = self.next_uri.take() {
            if let Err(e) = self.engine.cancel(&uri).await {
                tracing::warn!("Failed to cancel delegate statement: {:#}", e);
            }
        }
    }
}

/// Drives `source` into the entry behind `handle` until the result is
/// exhausted, fails, or the entry is removed.
pub async fn run_producer(handle: ProducerHandle, mut source: Box<dyn PageSource>, page_size: usize) {
    let query_id = handle.entry().query_id().to_string();

    let outcome = AssertUnwindSafe(drive(&handle, source.as_mut(), page_size))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(rows)) => {
            tracing::debug!(query_id = %query_id, rows, "Producer finished");
        }
        Ok(Err(error)) => {
            tracing::error!(
                target: ERRORS_TARGET,
                query_id = %query_id,
                code = %error.code,
                "Producer failed: {}",
                error.message
            );
            handle.fail(error.with_trace_id(&query_id));
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(
                target: ERRORS_TARGET,
                query_id = %query_id,
                "Producer panicked: {}",
                message
            );
            handle.fail(
                SluiceError::new(ErrorCode::InternalPanic, format!("Producer panicked: {}", message))
                    .with_trace_id(&query_id),
            );
        }
    }

    if AssertUnwindSafe(source.close()).catch_unwind().await.is_err() {
        tracing::error!(target: ERRORS_TARGET, query_id = %query_id, "Panic while closing result source");
    }
}

async fn drive(
    handle: &ProducerHandle,
    source: &mut dyn PageSource,
    page_size: usize,
) -> Result<usize, SluiceError> {
    let code = source.failure_code();
    let to_error = |e: anyhow::Error| SluiceError::new(code, format!("{:#}", e));
    let entry = handle.entry();

    let columns = tokio::select! {
        columns = source.columns() => columns.map_err(to_error)?,
        _ = entry.wait_closed() => {
            tracing::debug!(query_id = %entry.query_id(), "Entry removed while fetching columns");
            return Ok(0);
        }
    };
    handle.set_columns(columns);

    let mut produced = 0;
    loop {
        if handle.is_closed() {
            tracing::debug!(query_id = %entry.query_id(), "Entry removed, producer stopping");
            return Ok(produced);
        }

        let fetch = tokio::select! {
            fetch = source.next_page(page_size) => fetch.map_err(to_error)?,
            _ = entry.wait_closed() => {
                tracing::debug!(query_id = %entry.query_id(), "Entry removed while fetching a page");
                return Ok(produced);
            }
        };
        produced += fetch.rows.len();

        if !handle.push(fetch.rows).await {
            return Ok(produced);
        }
        if fetch.exhausted {
            return Ok(produced);
        }

        handle.wait_for_drain().await;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
