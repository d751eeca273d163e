//! SQL Server function translations.

use super::function_mapper::{null_expr, str_expr};
use super::FunctionMapper;

pub fn mssql_function_rules() -> FunctionMapper {
    FunctionMapper::new()
        .rename("nvl", "ISNULL")
        .rename("ifnull", "ISNULL")
        .rename("length", "LEN")
        .rename("char_length", "LEN")
        .rename("substr", "SUBSTRING")
        .rename("now", "GETDATE")
        .transform("group_concat", |args| {
            let expr = args.first().cloned().unwrap_or_else(null_expr);
            let sep = args.get(1).cloned().unwrap_or_else(|| str_expr(","));
            FunctionMapper::build_func("STRING_AGG", vec![expr, sep])
        })
}
