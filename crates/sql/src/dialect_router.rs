//! Dialect routing.
//!
//! Maps a dialect or source-type name (as written in `sources.yaml` or the
//! gateway's `client_dialect`) to a [`DialectProfile`]: the `sqlparser` dialect
//! used to read statements, the identifier quote character the target expects,
//! and the function translations applied when rewriting into it.
//!
//! Unknown names are not an error. They route to the generic profile with a
//! warning, so a new source type can be registered before its dialect is known.

use sqlparser::dialect::{dialect_from_str, Dialect, GenericDialect};

use crate::dialects::{
    mssql::mssql_function_rules, mysql::mysql_function_rules,
    postgres::postgres_function_rules, snowflake::snowflake_function_rules,
    sqlite::sqlite_function_rules, FunctionMapper,
};

#[derive(Debug, Clone)]
pub struct DialectProfile {
    name: &'static str,
    quote: char,
    mapper: FunctionMapper,
}

impl DialectProfile {
    fn new(name: &'static str, quote: char, mapper: FunctionMapper) -> Self {
        Self {
            name,
            quote,
            mapper,
        }
    }

    pub fn generic() -> Self {
        Self::new("generic", '"', FunctionMapper::new())
    }

    /// Canonical dialect name, as understood by `sqlparser`'s `dialect_from_str`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn quote_char(&self) -> char {
        self.quote
    }

    pub fn mapper(&self) -> &FunctionMapper {
        &self.mapper
    }

    /// A fresh parser dialect. Not `Send`, so callers build one per parse.
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        dialect_from_str(self.name).unwrap_or_else(|| Box::new(GenericDialect {}))
    }
}

/// Routes a dialect or source type name to its profile
pub fn route_dialect(name: &str) -> DialectProfile {
    match name.trim().to_lowercase().as_str() {
        "" | "generic" => DialectProfile::generic(),
        "ansi" => DialectProfile::new("ansi", '"', FunctionMapper::new()),
        "postgres" | "postgresql" => {
            DialectProfile::new("postgresql", '"', postgres_function_rules())
        }
        "mysql" | "mariadb" => DialectProfile::new("mysql", '`', mysql_function_rules()),
        "sqlite" | "sqlite3" => DialectProfile::new("sqlite", '"', sqlite_function_rules()),
        "snowflake" => DialectProfile::new("snowflake", '"', snowflake_function_rules()),
        "mssql" | "sqlserver" => DialectProfile::new("mssql", '[', mssql_function_rules()),
        "duckdb" => DialectProfile::new(
            "duckdb",
            '"',
            FunctionMapper::new()
                .rename("nvl", "COALESCE")
                .rename("getdate", "NOW"),
        ),
        "clickhouse" => DialectProfile::new(
            "clickhouse",
            '`',
            FunctionMapper::new()
                .rename("nvl", "ifNull")
                .rename("ifnull", "ifNull"),
        ),
        "bigquery" => DialectProfile::new(
            "bigquery",
            '`',
            FunctionMapper::new()
                .rename("nvl", "IFNULL")
                .rename("group_concat", "STRING_AGG")
                .rename("now", "CURRENT_TIMESTAMP"),
        ),
        _ => {
            tracing::warn!(
                dialect = %name,
                "No dialect profile available, falling back to generic SQL"
            );
            DialectProfile::generic()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dialects() {
        assert_eq!(route_dialect("postgres").name(), "postgresql");
        assert_eq!(route_dialect("PostgreSQL").name(), "postgresql");
        assert_eq!(route_dialect("mariadb").name(), "mysql");
        assert_eq!(route_dialect("sqlite").name(), "sqlite");
        assert_eq!(route_dialect("snowflake").name(), "snowflake");
    }

    #[test]
    fn test_quote_chars() {
        assert_eq!(route_dialect("mysql").quote_char(), '`');
        assert_eq!(route_dialect("mssql").quote_char(), '[');
        assert_eq!(route_dialect("postgres").quote_char(), '"');
    }

    #[test]
    fn test_fallback() {
        let profile = route_dialect("foobar");
        assert_eq!(profile.name(), "generic");
        assert!(profile.mapper().is_empty());
    }

    #[test]
    fn test_parser_dialect_resolves() {
        for name in ["generic", "postgres", "mysql", "sqlite", "snowflake", "mssql", "duckdb"] {
            let dialect = route_dialect(name).parser_dialect();
            assert!(
                sqlparser::parser::Parser::parse_sql(dialect.as_ref(), "SELECT 1").is_ok(),
                "{} failed to parse",
                name
            );
        }
    }
}
