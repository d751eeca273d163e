//! Per-dialect function translation rules.
//!
//! Each target dialect exposes a `*_function_rules()` builder. Rule keys are the
//! lowercase function names a client may write; values describe how the target
//! spells the same operation.
pub mod function_mapper;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod snowflake;
pub mod sqlite;

pub use function_mapper::{FunctionMapper, TransformFn, Translation};
