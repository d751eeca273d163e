use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use sluice_common::{Column, QueryType, Row};
use tokio::sync::mpsc;

/// Where the rows of an open result come from.
///
/// Each variant corresponds to a driver category rather than a source type:
/// blocking drivers push rows from a dedicated thread through a bounded channel,
/// async drivers expose a row stream.
pub enum RowSource {
    Blocking(mpsc::Receiver<Result<Row>>),
    Stream(BoxStream<'static, Result<Row>>),
}

/// Handle to an open result, owned by whoever fetches the next page.
pub struct ResultSet {
    columns: Vec<Column>,
    rows: RowSource,
    /// Read past the end of the previous page to learn whether it was the last.
    lookahead: Option<Result<Row>>,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.rows {
            RowSource::Blocking(_) => "blocking",
            RowSource::Stream(_) => "stream",
        };
        f.debug_struct("ResultSet")
            .field("kind", &kind)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl ResultSet {
    pub fn blocking(columns: Vec<Column>, rows: mpsc::Receiver<Result<Row>>) -> Self {
        Self {
            columns,
            rows: RowSource::Blocking(rows),
            lookahead: None,
        }
    }

    pub fn stream(columns: Vec<Column>, rows: BoxStream<'static, Result<Row>>) -> Self {
        Self {
            columns,
            rows: RowSource::Stream(rows),
            lookahead: None,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    async fn next_row(&mut self) -> Option<Result<Row>> {
        if let Some(row) = self.lookahead.take() {
            return Some(row);
        }
        match &mut self.rows {
            RowSource::Blocking(rows) => rows.recv().await,
            RowSource::Stream(rows) => rows.next().await,
        }
    }

    /// Reads up to `page_size` rows.
    ///
    /// Returns `None` for the handle once the underlying result is exhausted,
    /// including when the last page fills exactly.
    pub async fn next_page(
        mut self,
        column_count: usize,
        page_size: usize,
    ) -> Result<(Option<ResultSet>, Vec<Row>)> {
        let page_size = page_size.max(1);
        let mut page = Vec::with_capacity(page_size.min(1024));

        while page.len() < page_size {
            match self.next_row().await {
                Some(row) => {
                    let row = row.context("Failed to read row")?;
                    if row.len() != column_count {
                        anyhow::bail!(
                            "Row has {} values but {} columns were announced",
                            row.len(),
                            column_count
                        );
                    }
                    page.push(row);
                }
                None => return Ok((None, page)),
            }
        }

        // A read error here belongs to the next page.
        match self.next_row().await {
            Some(row) => {
                self.lookahead = Some(row);
                Ok((Some(self), page))
            }
            None => Ok((None, page)),
        }
    }
}

/// Execution contract for one data source.
///
/// A connector is used by a single producer at a time. `get_data` consumes the
/// handle and gives it back while more rows may exist.
#[async_trait]
pub trait Connector: Send {
    /// Starts executing `sql`. Errors here are what drive tier fallback.
    async fn get_result_set(&mut self, sql: &str) -> Result<ResultSet>;

    fn get_columns(&self, result_set: &ResultSet) -> Result<Vec<Column>> {
        Ok(result_set.columns().to_vec())
    }

    async fn get_data(
        &mut self,
        result_set: ResultSet,
        column_count: usize,
        query_type: QueryType,
        page_size: usize,
    ) -> Result<(Option<ResultSet>, Vec<Row>)>;

    async fn close(&mut self) -> Result<()>;
}
