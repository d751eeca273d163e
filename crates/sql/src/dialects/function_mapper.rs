//! Function Mapper
//!
//! Declarative registry for translating function names into a target dialect's syntax.

use sqlparser::ast::{
    Expr as SqlExpr, Function, FunctionArg, FunctionArgExpr, FunctionArgumentList,
    FunctionArguments, Ident, ObjectName, ObjectNamePart, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Closures receive plain positional arguments and return the replacement expression.
pub type TransformFn = Arc<dyn Fn(&[SqlExpr]) -> SqlExpr + Send + Sync>;

/// A translation rule for converting a function to target dialect
pub enum Translation {
    /// Simple rename: "nvl" → "COALESCE"
    Rename(&'static str),
    /// Custom transform with access to arguments
    Transform(TransformFn),
}

impl Clone for Translation {
    fn clone(&self) -> Self {
        match self {
            Translation::Rename(s) => Translation::Rename(s),
            Translation::Transform(f) => Translation::Transform(Arc::clone(f)),
        }
    }
}

/// Registry of function translations into one target dialect
pub struct FunctionMapper {
    rules: HashMap<&'static str, Translation>,
}

impl std::fmt::Debug for FunctionMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionMapper")
            .field("rules_count", &self.rules.len())
            .finish()
    }
}

impl Clone for FunctionMapper {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.iter().map(|(k, v)| (*k, v.clone())).collect(),
        }
    }
}

impl Default for FunctionMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionMapper {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add a simple rename rule
    pub fn rename(mut self, from: &'static str, to: &'static str) -> Self {
        self.rules.insert(from, Translation::Rename(to));
        self
    }

    /// Add a custom transform rule
    pub fn transform<F>(mut self, from: &'static str, f: F) -> Self
    where
        F: Fn(&[SqlExpr]) -> SqlExpr + Send + Sync + 'static,
    {
        self.rules.insert(from, Translation::Transform(Arc::new(f)));
        self
    }

    /// Rule registered for `func`, matched case-insensitively.
    pub fn rule(&self, func: &str) -> Option<&Translation> {
        self.rules.get(func.to_lowercase().as_str())
    }

    /// Translate a function call to target dialect syntax.
    /// Returns None if no translation rule exists.
    pub fn translate(&self, func: &str, args: &[SqlExpr]) -> Option<SqlExpr> {
        match self.rule(func)? {
            Translation::Rename(new_name) => Some(Self::build_func(new_name, args.to_vec())),
            Translation::Transform(f) => Some(f(args)),
        }
    }

    pub fn has_rule(&self, func: &str) -> bool {
        self.rule(func).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Helper to build a function AST node
    pub fn build_func(name: &str, args: Vec<SqlExpr>) -> SqlExpr {
        let sql_args = args
            .into_iter()
            .map(|arg| FunctionArg::Unnamed(FunctionArgExpr::Expr(arg)))
            .collect();

        let func_args = FunctionArguments::List(FunctionArgumentList {
            duplicate_treatment: None,
            args: sql_args,
            clauses: vec![],
        });

        SqlExpr::Function(Function {
            name: ObjectName(vec![ObjectNamePart::Identifier(Ident::new(name))]),
            args: func_args,
            filter: None,
            null_treatment: None,
            over: None,
            within_group: vec![],
            parameters: FunctionArguments::None,
            uses_odbc_syntax: false,
        })
    }

    /// Function call without a parenthesised argument list, e.g. `CURRENT_TIMESTAMP`.
    pub fn build_keyword_func(name: &str) -> SqlExpr {
        SqlExpr::Function(Function {
            name: ObjectName(vec![ObjectNamePart::Identifier(Ident::new(name))]),
            args: FunctionArguments::None,
            filter: None,
            null_treatment: None,
            over: None,
            within_group: vec![],
            parameters: FunctionArguments::None,
            uses_odbc_syntax: false,
        })
    }
}

pub(crate) fn null_expr() -> SqlExpr {
    SqlExpr::Value(Value::Null.into())
}

pub(crate) fn str_expr(s: &str) -> SqlExpr {
    SqlExpr::Value(Value::SingleQuotedString(s.to_string()).into())
}
