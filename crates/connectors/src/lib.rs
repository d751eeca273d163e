//! Connectors for Sluice.
//!
//! - [`connector`]: the narrow execution contract every source type implements,
//!   and the tagged [`ResultSet`] handle passed between fetches.
//! - [`sources`]: per-type connector providers and the registry that picks one
//!   for a data source.
//! - [`delegate`]: client for the external federated engine used as the last
//!   fallback tier.
pub mod connector;
pub mod delegate;
pub mod sources;

pub use connector::{Connector, ResultSet, RowSource};
pub use delegate::{DelegateEngine, HttpDelegateClient, StatementResponse};
pub use sources::{default_registry, ConnectorProvider, ConnectorRegistry};
