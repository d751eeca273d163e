//! Sluice runtime: the streaming query execution and pagination engine.
//!
//! A submitted query flows through these pieces:
//!
//! ```text
//!  submit ──► admission ──► tables ──► routing ──► fallback tiers
//!                                                     │
//!                                              ┌──────┴──────┐
//!                                              │ worker pool │──► producer ──► ResultEntry buffer
//!                                              └─────────────┘                       │
//!  fetch_next(query_id, slug, token) ──────────────────────────────► wait + drain ◄─┘
//! ```
//!
//! - [`gateway`]: `QueryGateway`, the fetch coordinator and continuation handler.
//! - [`cache`]: per-query result entries and the live-query counter.
//! - [`pool`]: bounded set of producer slots.
//! - [`producer`]: page sources and the producer loop.
//! - [`fallback`]: direct → transpiled → delegated execution.
//! - [`sweeper`]: background eviction of entries past their deadline.
//! - [`ids`], [`continuation`]: query ids, slugs and continuation URIs.
//! - [`catalog`], [`credentials`]: data-source lookup and credential decryption.

pub mod cache;
pub mod catalog;
pub mod continuation;
pub mod credentials;
pub mod fallback;
pub mod gateway;
pub mod ids;
pub mod pool;
pub mod producer;
pub mod sweeper;

pub use cache::{RemovalReason, ResultCache, ResultEntry};
pub use catalog::{DataSourceCatalog, StaticCatalog};
pub use continuation::ContinuationUri;
pub use credentials::{CredentialDecryptor, PlaintextDecryptor};
pub use fallback::Tier;
pub use gateway::{GatewayOptions, QueryGateway};
pub use pool::WorkerPool;
pub use sweeper::CacheSweeper;
