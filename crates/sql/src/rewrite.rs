//! Statement rewrites applied before execution.

use std::ops::ControlFlow;

use sluice_error::Result;
use sqlparser::ast::{visit_relations_mut, ObjectName};
use sqlparser::parser::Parser;

use crate::dialect_router::route_dialect;
use crate::tables::part_ident;

/// Caps a synchronous query at `limit` rows.
///
/// Only statements that start with `SELECT` or `WITH` are wrapped; anything
/// else is returned trimmed but otherwise unchanged.
pub fn wrap_sync_limit(sql: &str, limit: usize) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    if keyword.eq_ignore_ascii_case("select") || keyword.eq_ignore_ascii_case("with") {
        format!("SELECT * FROM ({}) LIMIT {}", trimmed, limit)
    } else {
        trimmed.to_string()
    }
}

/// Removes `qualifier` as the leading name part of every relation in `sql`.
///
/// `cat1.t1` becomes `t1` and `cat1.public.t1` becomes `public.t1`; relations
/// with a different or no qualifier are left alone. The statement is re-rendered
/// from its AST.
pub fn strip_qualifier(sql: &str, qualifier: &str, dialect: &str) -> Result<String> {
    let parser_dialect = route_dialect(dialect).parser_dialect();
    let mut statements = Parser::parse_sql(parser_dialect.as_ref(), sql)?;

    let _ = visit_relations_mut(&mut statements, |name: &mut ObjectName| {
        let leading_matches = name.0.len() >= 2
            && name
                .0
                .first()
                .and_then(part_ident)
                .is_some_and(|ident| ident.value.eq_ignore_ascii_case(qualifier));
        if leading_matches {
            name.0.remove(0);
        }
        ControlFlow::<()>::Continue(())
    });

    Ok(statements
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("; "))
}
