//! SQL handling for Sluice.
//!
//! The gateway never plans or executes SQL itself. This crate only inspects and
//! rewrites statement text:
//! - **Tables**: which relations a statement references, and under which source-qualifier (`tables`).
//! - **Dialects**: per-dialect parser, quoting and function-mapping profiles (`dialect_router`, `dialects`).
//! - **Rewrites**: synchronous LIMIT capping and qualifier stripping (`rewrite`).
//! - **Transpilation**: moving a statement between dialects (`transpile`).
pub mod dialect_router;
pub mod dialects;
pub mod rewrite;
pub mod tables;
pub mod transpile;

pub use dialect_router::{route_dialect, DialectProfile};
pub use rewrite::{strip_qualifier, wrap_sync_limit};
pub use tables::{SqlParserTableExtractor, TableExtractor, TableRef};
pub use transpile::{SqlTranspiler, Transpiler};
