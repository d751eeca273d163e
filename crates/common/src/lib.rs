//! Common utilities, types, and configurations shared across Sluice crates.
//!
//! - **Configuration**: Strongly typed gateway and data-source configuration (`config`).
//! - **Models**: Query request/response shapes and column/row types (`models`).
//! - **Logging**: PII scrubbing for logged SQL (`scrubber`) and subscriber setup (`telemetry`).
pub mod config;
pub mod models;
pub mod scrubber;
pub mod telemetry;

pub use crate::models::{
    Column, DataSourceConfig, QueryRequest, QueryResponse, QueryType, Row, SourcesConfig,
};
