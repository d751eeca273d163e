//! Tiered execution.
//!
//! A single-source statement is tried, in order:
//!
//! 1. **Direct**: qualifier stripped, run on the source as written.
//! 2. **Transpiled**: translated from the client dialect to the source's
//!    native dialect, on a fresh connector.
//! 3. **Delegated**: the untranslated statement goes to the delegate engine.
//!
//! Each tier runs only if the one before it failed, and no tier is retried.
//! Unknown data sources and qualifier mismatches are the caller's fault and
//! stop the chain immediately. Multi-source statements start at tier 3.

use std::sync::Arc;

use anyhow::Context;
use sluice_common::{DataSourceConfig, QueryType};
use sluice_connectors::{ConnectorRegistry, DelegateEngine};
use sluice_error::{find_closest_match, ErrorCode, ErrorContext, Result, SluiceError, TierFailure};
use sluice_sql::{strip_qualifier, Transpiler};

use crate::catalog::DataSourceCatalog;
use crate::credentials::CredentialDecryptor;
use crate::producer::{ConnectorSource, DelegateSource, PageSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Direct,
    Transpiled,
    Delegated,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Direct => "direct",
            Tier::Transpiled => "transpile",
            Tier::Delegated => "delegate",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tier that produced a result, and the source to stream it from.
pub struct Execution {
    pub tier: Tier,
    pub source: Box<dyn PageSource>,
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution").field("tier", &self.tier).finish()
    }
}

/// A statement that reads from exactly one source-qualifier.
#[derive(Debug, Clone)]
pub struct SingleSourceQuery<'a> {
    pub sql: &'a str,
    pub data_source_id: &'a str,
    pub qualifier: &'a str,
    pub query_type: QueryType,
}

pub struct FallbackExecutor {
    catalog: Arc<dyn DataSourceCatalog>,
    credentials: Arc<dyn CredentialDecryptor>,
    registry: Arc<ConnectorRegistry>,
    transpiler: Arc<dyn Transpiler>,
    delegate: Option<Arc<dyn DelegateEngine>>,
    client_dialect: String,
}

impl FallbackExecutor {
    pub fn new(
        catalog: Arc<dyn DataSourceCatalog>,
        credentials: Arc<dyn CredentialDecryptor>,
        registry: Arc<ConnectorRegistry>,
        transpiler: Arc<dyn Transpiler>,
        delegate: Option<Arc<dyn DelegateEngine>>,
        client_dialect: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            credentials,
            registry,
            transpiler,
            delegate,
            client_dialect: client_dialect.into(),
        }
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    /// Runs the full direct → transpiled → delegated chain.
    pub async fn execute_single_source(&self, query: SingleSourceQuery<'_>) -> Result<Execution> {
        let source = self.resolve_source(query.data_source_id).await?;

        if !source.catalog.eq_ignore_ascii_case(query.qualifier) {
            return Err(SluiceError::new(
                ErrorCode::SourceQualifierMismatch,
                format!(
                    "Statement reads from '{}' but data source '{}' serves '{}'",
                    query.qualifier, source.id, source.catalog
                ),
            )
            .with_context(ErrorContext::QualifierMismatch {
                data_source_id: source.id.clone(),
                configured: source.catalog.clone(),
                found: vec![query.qualifier.to_string()],
            })
            .with_hint(format!(
                "Qualify tables as {}.<table> or pick the matching data source",
                source.catalog
            )));
        }

        let mut failures = Vec::new();

        match self.try_direct(&source, &query).await {
            Ok(connector_source) => {
                return Ok(Execution {
                    tier: Tier::Direct,
                    source: Box::new(connector_source),
                })
            }
            Err(e) => {
                tracing::warn!(
                    data_source = %source.id,
                    "Direct execution failed, trying dialect translation: {:#}",
                    e
                );
                failures.push(tier_failure(Tier::Direct, &e));
            }
        }

        match self.try_transpiled(&source, &query).await {
            Ok(connector_source) => {
                return Ok(Execution {
                    tier: Tier::Transpiled,
                    source: Box::new(connector_source),
                })
            }
            Err(e) => {
                tracing::warn!(
                    data_source = %source.id,
                    "Transpiled execution failed, delegating: {:#}",
                    e
                );
                failures.push(tier_failure(Tier::Transpiled, &e));
            }
        }

        self.execute_delegated(query.sql, failures).await
    }

    /// Submits `sql` to the delegate engine. `failures` holds the tiers already
    /// tried; it is empty for multi-source statements.
    pub async fn execute_delegated(
        &self,
        sql: &str,
        mut failures: Vec<TierFailure>,
    ) -> Result<Execution> {
        let Some(engine) = &self.delegate else {
            let message = "No delegate engine configured";
            if failures.is_empty() {
                return Err(SluiceError::new(ErrorCode::DelegateUnavailable, message)
                    .with_hint("Statements spanning several sources need a delegate engine"));
            }
            failures.push(TierFailure::new(Tier::Delegated.as_str(), message));
            return Err(exhausted(failures));
        };

        match engine.submit_statement(sql).await {
            Ok(submitted) => {
                tracing::debug!(delegate_query_id = %submitted.id, "Delegate accepted statement");
                Ok(Execution {
                    tier: Tier::Delegated,
                    source: Box::new(DelegateSource::new(engine.clone(), submitted)),
                })
            }
            Err(e) if failures.is_empty() => Err(SluiceError::new(
                ErrorCode::DelegateFailed,
                format!("{:#}", e),
            )),
            Err(e) => {
                failures.push(tier_failure(Tier::Delegated, &e));
                Err(exhausted(failures))
            }
        }
    }

    async fn resolve_source(&self, id: &str) -> Result<DataSourceConfig> {
        if let Some(source) = self.catalog.get(id).await {
            return Ok(source);
        }

        let available = self.catalog.ids().await;
        let mut err = SluiceError::new(
            ErrorCode::DataSourceNotFound,
            format!("Data source '{}' not found", id),
        );
        if let Some(suggestion) = find_closest_match(id, &available) {
            err = err.with_hint(format!("Did you mean '{}'?", suggestion));
        }
        Err(err.with_context(ErrorContext::DataSourceNotFound {
            data_source_id: id.to_string(),
            available_sources: available,
        }))
    }

    async fn try_direct(
        &self,
        source: &DataSourceConfig,
        query: &SingleSourceQuery<'_>,
    ) -> anyhow::Result<ConnectorSource> {
        let sql = strip_qualifier(query.sql, query.qualifier, &self.client_dialect)?;
        self.open(source, &sql, query.query_type).await
    }

    async fn try_transpiled(
        &self,
        source: &DataSourceConfig,
        query: &SingleSourceQuery<'_>,
    ) -> anyhow::Result<ConnectorSource> {
        let stripped = strip_qualifier(query.sql, query.qualifier, &self.client_dialect)?;
        let sql = self
            .transpiler
            .transpile(&stripped, &self.client_dialect, source.native_dialect())
            .context("Dialect translation failed")?;
        tracing::debug!(
            from = %self.client_dialect,
            to = %source.native_dialect(),
            "Retrying with translated statement"
        );
        self.open(source, &sql, query.query_type).await
    }

    async fn open(
        &self,
        source: &DataSourceConfig,
        sql: &str,
        query_type: QueryType,
    ) -> anyhow::Result<ConnectorSource> {
        let credential = self
            .credentials
            .decrypt(source)
            .await
            .with_context(|| format!("Failed to decrypt credentials for '{}'", source.id))?;

        let mut connector = self.registry.connect(source, credential).await?;
        let result_set = connector.get_result_set(sql).await?;
        Ok(ConnectorSource::new(connector, result_set, query_type))
    }
}

/// Records why `tier` failed, keeping the code of any `SluiceError` in the chain.
fn tier_failure(tier: Tier, e: &anyhow::Error) -> TierFailure {
    let failure = TierFailure::new(tier.as_str(), format!("{:#}", e));
    match e.chain().find_map(|cause| cause.downcast_ref::<SluiceError>()) {
        Some(inner) => failure.with_code(inner.code),
        None => failure,
    }
}

fn exhausted(failures: Vec<TierFailure>) -> SluiceError {
    let last = failures
        .last()
        .map(|f| f.message.clone())
        .unwrap_or_default();
    SluiceError::new(
        ErrorCode::FallbackExhausted,
        format!("All execution tiers failed: {}", last),
    )
    .with_context(ErrorContext::Fallback { attempts: failures })
}
