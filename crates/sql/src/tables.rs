//! Table extraction.
//!
//! A statement's routing depends only on which relations it reads and which
//! source-qualifier each one carries. `orders` has no qualifier, `sales.orders`
//! and `sales.public.orders` both carry `sales`.

use std::collections::HashSet;
use std::ops::ControlFlow;

use sluice_error::{ErrorCode, Result, SluiceError};
use sqlparser::ast::{Ident, ObjectName, ObjectNamePart, Query, Visit, Visitor};
use sqlparser::parser::Parser;

use crate::dialect_router::route_dialect;

/// A relation referenced by a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Source-qualifier; empty when the reference has a single name part.
    pub catalog: String,
    pub name: String,
}

impl TableRef {
    pub fn new(catalog: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            name: name.into(),
        }
    }

    fn from_parts(parts: &[String]) -> Self {
        match parts {
            [] => Self::new("", ""),
            [name] => Self::new("", name.clone()),
            [catalog, rest @ ..] => Self::new(catalog.clone(), rest.join(".")),
        }
    }
}

pub trait TableExtractor: Send + Sync {
    /// Relations referenced by `sql`, parsed in `dialect`. CTE names are not relations.
    fn extract_tables(&self, sql: &str, dialect: &str) -> Result<Vec<TableRef>>;
}

#[derive(Debug, Default, Clone)]
pub struct SqlParserTableExtractor;

impl SqlParserTableExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TableExtractor for SqlParserTableExtractor {
    fn extract_tables(&self, sql: &str, dialect: &str) -> Result<Vec<TableRef>> {
        let parser_dialect = route_dialect(dialect).parser_dialect();
        let statements = Parser::parse_sql(parser_dialect.as_ref(), sql)?;

        let mut collector = RelationCollector::default();
        let _ = statements.visit(&mut collector);

        let mut seen = HashSet::new();
        let tables = collector
            .relations
            .into_iter()
            .filter(|parts| {
                !(parts.len() == 1 && collector.ctes.contains(&parts[0].to_lowercase()))
            })
            .map(|parts| TableRef::from_parts(&parts))
            .filter(|table| seen.insert(table.clone()))
            .collect();

        Ok(tables)
    }
}

#[derive(Default)]
struct RelationCollector {
    ctes: HashSet<String>,
    relations: Vec<Vec<String>>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.push(name_parts(relation));
        ControlFlow::Continue(())
    }
}

/// Unquoted values of an object name's identifier parts.
pub(crate) fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .filter_map(part_ident)
        .map(|ident| ident.value.clone())
        .collect()
}

#[allow(irrefutable_let_patterns)]
pub(crate) fn part_ident(part: &ObjectNamePart) -> Option<&Ident> {
    if let ObjectNamePart::Identifier(ident) = part {
        Some(ident)
    } else {
        None
    }
}

/// Single shared non-empty qualifier across `tables`, if there is one.
pub fn single_qualifier(tables: &[TableRef]) -> Option<&str> {
    let first = tables.first()?.catalog.as_str();
    if first.is_empty() {
        return None;
    }
    tables
        .iter()
        .all(|t| t.catalog.eq_ignore_ascii_case(first))
        .then_some(first)
}

/// Client error for statements that reference no relation at all.
pub fn no_table_error() -> SluiceError {
    SluiceError::new(ErrorCode::NoTableFound, "No table referenced in statement")
        .with_hint("Reference at least one table as <catalog>.<table>")
}
