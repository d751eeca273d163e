//! Fetch coordinator and continuation handler.
//!
//! `QueryGateway` is the one owned service object behind the transport layer.
//! It holds the result cache, the live-query counter (inside the cache), the
//! worker pool and the execution tiers; nothing here is a process global.
//!
//! # Query Lifecycle
//!
//! 1. `submit`: admission, id + slug, cache entry with an absolute deadline.
//! 2. Synchronous statements are LIMIT-wrapped to one batch.
//! 3. Referenced tables decide routing: one shared qualifier runs the full
//!    fallback chain, anything else goes straight to the delegate engine.
//! 4. A producer is submitted to the pool; the caller waits for page 0.
//! 5. `fetch_next` validates `(query_id, slug, token)` and waits for the next page.
//! 6. Whoever observes "finished and empty", an error, or its own cancellation
//!    removes the entry.

use std::sync::Arc;
use std::time::Duration;

use sluice_common::config::{AppConfig, GatewaySettings};
use sluice_common::scrubber::scrub_for_log;
use sluice_common::telemetry::QUERIES_TARGET;
use sluice_common::{QueryRequest, QueryResponse, QueryType, SourcesConfig};
use sluice_connectors::{
    default_registry, ConnectorProvider, ConnectorRegistry, DelegateEngine, HttpDelegateClient,
};
use sluice_error::{ErrorCode, Result, SluiceError};
use sluice_sql::tables::{no_table_error, single_qualifier};
use sluice_sql::{SqlParserTableExtractor, SqlTranspiler, TableExtractor, Transpiler};
use tokio::time::Instant;

use crate::cache::{token_mismatch, RemovalReason, ResultCache, ResultEntry};
use crate::catalog::{DataSourceCatalog, StaticCatalog};
use crate::continuation::ContinuationUri;
use crate::credentials::{CredentialDecryptor, PlaintextDecryptor};
use crate::fallback::{FallbackExecutor, SingleSourceQuery};
use crate::ids::{cache_key, new_slug, QueryIdGenerator};
use crate::pool::WorkerPool;
use crate::producer::run_producer;
use crate::sweeper::CacheSweeper;

const LOGGED_SQL_LEN: usize = 1000;

pub struct GatewayOptions {
    pub settings: GatewaySettings,
    /// Base URL continuation URIs are built on.
    pub public_url: String,
    pub catalog: Arc<dyn DataSourceCatalog>,
    pub credentials: Arc<dyn CredentialDecryptor>,
    pub registry: ConnectorRegistry,
    pub table_extractor: Arc<dyn TableExtractor>,
    pub transpiler: Arc<dyn Transpiler>,
    pub delegate: Option<Arc<dyn DelegateEngine>>,
}

impl GatewayOptions {
    /// Options with the built-in collaborators and no delegate engine.
    pub fn new(
        settings: GatewaySettings,
        public_url: impl Into<String>,
        sources: SourcesConfig,
    ) -> Self {
        Self {
            settings,
            public_url: public_url.into(),
            catalog: Arc::new(StaticCatalog::new(sources)),
            credentials: Arc::new(PlaintextDecryptor),
            registry: default_registry(),
            table_extractor: Arc::new(SqlParserTableExtractor::new()),
            transpiler: Arc::new(SqlTranspiler::new()),
            delegate: None,
        }
    }

    /// Options from application config, with an HTTP delegate client when one
    /// is configured.
    pub fn from_config(config: &AppConfig, sources: SourcesConfig) -> anyhow::Result<Self> {
        let mut options = Self::new(
            config.gateway.clone(),
            config.server.public_url.clone(),
            sources,
        );
        if let Some(delegate) = &config.delegate {
            options.delegate = Some(Arc::new(HttpDelegateClient::new(delegate)?));
        }
        Ok(options)
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn DelegateEngine>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_connector_provider(mut self, provider: Box<dyn ConnectorProvider>) -> Self {
        self.registry.register_provider(provider);
        self
    }

    pub fn with_transpiler(mut self, transpiler: Arc<dyn Transpiler>) -> Self {
        self.transpiler = transpiler;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialDecryptor>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn DataSourceCatalog>) -> Self {
        self.catalog = catalog;
        self
    }
}

pub struct QueryGateway {
    cache: Arc<ResultCache>,
    pool: WorkerPool,
    ids: QueryIdGenerator,
    executor: FallbackExecutor,
    table_extractor: Arc<dyn TableExtractor>,
    settings: GatewaySettings,
    public_url: String,
}

impl QueryGateway {
    pub fn new(options: GatewayOptions) -> Self {
        let capacity = options.settings.worker_pool_size.max(1);
        let executor = FallbackExecutor::new(
            options.catalog,
            options.credentials,
            Arc::new(options.registry),
            options.transpiler,
            options.delegate,
            options.settings.client_dialect.clone(),
        );

        Self {
            cache: Arc::new(ResultCache::new(capacity)),
            pool: WorkerPool::new(capacity),
            ids: QueryIdGenerator::new(),
            executor,
            table_extractor: options.table_extractor,
            settings: options.settings,
            public_url: options.public_url,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn live_queries(&self) -> usize {
        self.cache.live_queries()
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn coordinator_id(&self) -> &str {
        self.ids.coordinator_id()
    }

    /// Starts the periodic deadline sweep over this gateway's cache.
    pub fn spawn_sweeper(&self) -> CacheSweeper {
        CacheSweeper::spawn(
            self.cache.clone(),
            Duration::from_secs(self.settings.sweep_interval_secs.max(1)),
        )
    }

    /// Submits a query and waits for its first page.
    pub async fn submit(&self, request: QueryRequest) -> Result<QueryResponse> {
        validate_request(&request)?;

        let admission = self.cache.admit()?;
        let query_id = self.ids.next_id().await;
        let entry = ResultEntry::new(
            query_id.clone(),
            new_slug(),
            request.query_type,
            request.batch_size,
            self.settings.result_buffer_capacity,
            Instant::now() + Duration::from_secs(self.settings.max_run_time_secs),
        );
        self.cache.register(admission, entry.clone());
        let mut guard = EntryGuard::new(&self.cache, entry.key());

        if let Err(error) = self.start(&entry, &request).await {
            guard.set_reason(RemovalReason::Failed);
            tracing::warn!(
                target: QUERIES_TARGET,
                query_id = %query_id,
                data_source = %request.data_source_id,
                code = %error.code,
                "Query failed to start: {}",
                error.message
            );
            return Err(error.with_trace_id(query_id));
        }

        let timeout = match request.query_type {
            QueryType::Stream if request.timeout > 0 => Some(Duration::from_secs(request.timeout)),
            _ => None,
        };
        self.wait_page(&entry, 0, request.batch_size, timeout, guard)
            .await
            .map_err(|e| e.with_trace_id(&query_id))
    }

    /// Serves the page a continuation URI points at.
    ///
    /// `batch_size` defaults to the one given at submission; `timeout` applies
    /// to streaming queries only and defaults to the configured response timeout.
    pub async fn fetch_next(
        &self,
        query_id: &str,
        slug: &str,
        token: u64,
        batch_size: Option<usize>,
        timeout: Option<u64>,
    ) -> Result<QueryResponse> {
        let key = cache_key(query_id, slug);
        let entry = self.cache.get(&key).ok_or_else(|| query_not_found(query_id))?;

        let current = entry.token();
        if current != token {
            return Err(token_mismatch(current, token).with_trace_id(query_id));
        }

        let batch_size = batch_size
            .filter(|b| *b > 0)
            .unwrap_or_else(|| entry.batch_size());
        let timeout = match entry.query_type() {
            QueryType::Stream => {
                let secs = timeout.unwrap_or(self.settings.default_timeout_secs);
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            QueryType::Sync => None,
        };

        let guard = EntryGuard::new(&self.cache, key);
        self.wait_page(&entry, token, batch_size, timeout, guard)
            .await
            .map_err(|e| e.with_trace_id(query_id))
    }

    /// Everything between admission and a running producer.
    async fn start(&self, entry: &Arc<ResultEntry>, request: &QueryRequest) -> Result<()> {
        let sql = match request.query_type {
            QueryType::Sync => sluice_sql::wrap_sync_limit(&request.sql, request.batch_size),
            QueryType::Stream => request.sql.clone(),
        };

        let tables = self
            .table_extractor
            .extract_tables(&sql, &self.settings.client_dialect)?;
        if tables.is_empty() {
            return Err(no_table_error());
        }

        let execution = match single_qualifier(&tables) {
            Some(qualifier) => {
                self.executor
                    .execute_single_source(SingleSourceQuery {
                        sql: &sql,
                        data_source_id: &request.data_source_id,
                        qualifier,
                        query_type: request.query_type,
                    })
                    .await?
            }
            None => {
                tracing::debug!(
                    query_id = %entry.query_id(),
                    tables = tables.len(),
                    "Statement spans several sources, delegating"
                );
                self.executor.execute_delegated(&sql, Vec::new()).await?
            }
        };

        entry.set_tier(execution.tier.as_str());
        tracing::info!(
            target: QUERIES_TARGET,
            query_id = %entry.query_id(),
            data_source = %request.data_source_id,
            query_type = %request.query_type,
            tier = %execution.tier,
            sql = %scrub_for_log(&request.sql, LOGGED_SQL_LEN),
            "Query started"
        );

        let producer = entry
            .attach_producer()
            .ok_or_else(|| SluiceError::internal("Query already has a producer"))?;
        let page_size = request.batch_size.min(self.settings.page_size).max(1);
        self.pool
            .submit(run_producer(producer, execution.source, page_size))
            .await
            .map_err(|e| SluiceError::internal(e.to_string()))?;
        Ok(())
    }

    /// Waits for and hands out the page at `token`.
    ///
    /// A streaming timeout is not an error: it returns an empty page whose
    /// continuation URI repeats the current token. A page can come back short
    /// when `batch_size` exceeds what the result buffer holds.
    async fn wait_page(
        &self,
        entry: &Arc<ResultEntry>,
        token: u64,
        batch_size: usize,
        timeout: Option<Duration>,
        mut guard: EntryGuard<'_>,
    ) -> Result<QueryResponse> {
        let batch_size = batch_size.max(1);
        entry.set_demand(batch_size);

        match timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, entry.wait_ready(batch_size))
                    .await
                    .is_err()
                {
                    guard.disarm();
                    return Ok(QueryResponse {
                        columns: entry.columns().unwrap_or_default(),
                        entries: Vec::new(),
                        total_count: 0,
                        next_uri: Some(self.continuation(entry, token)),
                    });
                }
            }
            None => entry.wait_ready(batch_size).await,
        }

        if let Some(error) = entry.error() {
            guard.set_reason(RemovalReason::Failed);
            return Err(error);
        }
        if entry.is_closed() {
            guard.disarm();
            return Err(query_not_found(entry.query_id()));
        }

        let page = match entry.take_page(token, batch_size).await {
            Ok(page) => page,
            Err(e) => {
                // Another request consumed this token first.
                guard.disarm();
                return Err(e);
            }
        };

        // Rows buffered before a failure are not delivered.
        if let Some(error) = entry.error() {
            guard.set_reason(RemovalReason::Failed);
            return Err(error);
        }

        let next_uri = match page.next_token {
            Some(next) => {
                guard.disarm();
                Some(self.continuation(entry, next))
            }
            None => {
                guard.set_reason(RemovalReason::Exhausted);
                tracing::info!(
                    target: QUERIES_TARGET,
                    query_id = %entry.query_id(),
                    tier = entry.tier().unwrap_or("unknown"),
                    rows = entry.delivered_rows(),
                    duration_ms = entry.age().as_millis() as u64,
                    "Query completed"
                );
                None
            }
        };

        let total_count = page.rows.len();
        Ok(QueryResponse {
            columns: entry.columns().unwrap_or_default(),
            entries: page.rows,
            total_count,
            next_uri,
        })
    }

    fn continuation(&self, entry: &ResultEntry, token: u64) -> String {
        ContinuationUri::new(entry.query_id(), entry.slug(), token).to_uri(&self.public_url)
    }
}

/// Removes its entry when dropped, unless disarmed.
///
/// Created armed with `Cancelled`, so a caller future dropped mid-wait cleans
/// up through the same path as every other terminal condition.
struct EntryGuard<'a> {
    cache: &'a ResultCache,
    key: String,
    reason: Option<RemovalReason>,
}

impl<'a> EntryGuard<'a> {
    fn new(cache: &'a ResultCache, key: String) -> Self {
        Self {
            cache,
            key,
            reason: Some(RemovalReason::Cancelled),
        }
    }

    fn set_reason(&mut self, reason: RemovalReason) {
        self.reason = Some(reason);
    }

    fn disarm(&mut self) {
        self.reason = None;
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        if let Some(reason) = self.reason {
            self.cache.remove(&self.key, reason);
        }
    }
}

fn validate_request(request: &QueryRequest) -> Result<()> {
    if request.sql.trim().is_empty() {
        return Err(SluiceError::new(ErrorCode::InvalidRequest, "Statement is empty"));
    }
    if request.batch_size == 0 {
        return Err(
            SluiceError::new(ErrorCode::InvalidRequest, "batch_size must be at least 1")
                .with_hint("Omit batch_size to use the default"),
        );
    }
    Ok(())
}

fn query_not_found(query_id: &str) -> SluiceError {
    SluiceError::new(
        ErrorCode::QueryNotFound,
        format!("No live query {} for this continuation", query_id),
    )
    .with_hint("The query finished, failed, expired, or the URI is wrong")
}
