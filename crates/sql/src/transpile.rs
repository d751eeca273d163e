//! Dialect transpilation.
//!
//! The transpiler reads a statement in the caller's dialect and renders it for
//! the target: quoted identifiers take the target's quote character and
//! function calls go through the target's [`FunctionMapper`](crate::dialects::FunctionMapper).

use std::ops::ControlFlow;

use sluice_error::{ErrorCode, Result, SluiceError};
use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, ObjectName,
    ObjectNamePart, VisitMut, VisitorMut,
};
use sqlparser::parser::Parser;

use crate::dialect_router::{route_dialect, DialectProfile};
use crate::dialects::Translation;
use crate::tables::part_ident;

pub trait Transpiler: Send + Sync {
    fn transpile(&self, sql: &str, from_dialect: &str, to_dialect: &str) -> Result<String>;
}

#[derive(Debug, Default, Clone)]
pub struct SqlTranspiler;

impl SqlTranspiler {
    pub fn new() -> Self {
        Self
    }
}

impl Transpiler for SqlTranspiler {
    fn transpile(&self, sql: &str, from_dialect: &str, to_dialect: &str) -> Result<String> {
        let source = route_dialect(from_dialect);
        let target = route_dialect(to_dialect);

        let parser_dialect = source.parser_dialect();
        let mut statements = Parser::parse_sql(parser_dialect.as_ref(), sql).map_err(|e| {
            SluiceError::new(
                ErrorCode::TranspileFailed,
                format!("Cannot read statement as {}: {}", source.name(), e),
            )
        })?;

        let mut rewriter = DialectRewriter { target: &target };
        let _ = statements.visit(&mut rewriter);

        let rendered = statements
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("; ");

        tracing::debug!(
            from = source.name(),
            to = target.name(),
            "Transpiled statement"
        );
        Ok(rendered)
    }
}

struct DialectRewriter<'a> {
    target: &'a DialectProfile,
}

impl DialectRewriter<'_> {
    fn requote(&self, ident: &mut Ident) {
        if ident.quote_style.is_some() {
            ident.quote_style = Some(self.target.quote_char());
        }
    }

    /// Renames happen in place; transforms return the replacement expression.
    fn map_function(&self, func: &mut Function) -> Option<Expr> {
        if func.name.0.len() != 1 {
            return None;
        }
        let name = part_ident(&func.name.0[0])?.value.clone();

        match self.target.mapper().rule(&name)? {
            Translation::Rename(new_name) => {
                func.name = ObjectName(vec![ObjectNamePart::Identifier(Ident::new(*new_name))]);
                None
            }
            Translation::Transform(f) => {
                if func.over.is_some() || func.filter.is_some() {
                    return None;
                }
                let args = plain_args(&func.args)?;
                Some(f(&args))
            }
        }
    }
}

/// Positional expression arguments, or None when the call uses anything fancier.
fn plain_args(args: &FunctionArguments) -> Option<Vec<Expr>> {
    match args {
        FunctionArguments::None => Some(vec![]),
        FunctionArguments::List(list)
            if list.duplicate_treatment.is_none() && list.clauses.is_empty() =>
        {
            list.args
                .iter()
                .map(|arg| match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e.clone()),
                    _ => None,
                })
                .collect()
        }
        _ => None,
    }
}

impl VisitorMut for DialectRewriter<'_> {
    type Break = ();

    #[allow(irrefutable_let_patterns)]
    fn post_visit_relation(&mut self, relation: &mut ObjectName) -> ControlFlow<Self::Break> {
        for part in relation.0.iter_mut() {
            if let ObjectNamePart::Identifier(ident) = part {
                self.requote(ident);
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.requote(ident),
            Expr::CompoundIdentifier(idents) => {
                for ident in idents.iter_mut() {
                    self.requote(ident);
                }
            }
            Expr::Function(func) => {
                if let Some(replacement) = self.map_function(func) {
                    *expr = replacement;
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}
