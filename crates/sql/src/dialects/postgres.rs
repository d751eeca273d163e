//! PostgreSQL function translations.

use super::function_mapper::{null_expr, str_expr};
use super::FunctionMapper;

pub fn postgres_function_rules() -> FunctionMapper {
    FunctionMapper::new()
        .rename("nvl", "COALESCE")
        .rename("ifnull", "COALESCE")
        .rename("isnull", "COALESCE")
        .rename("len", "LENGTH")
        .rename("getdate", "NOW")
        .rename("json_group_array", "JSON_AGG")
        .transform("group_concat", |args| {
            let expr = args.first().cloned().unwrap_or_else(null_expr);
            let sep = args.get(1).cloned().unwrap_or_else(|| str_expr(","));
            FunctionMapper::build_func("STRING_AGG", vec![expr, sep])
        })
        .transform("listagg", |args| {
            let expr = args.first().cloned().unwrap_or_else(null_expr);
            let sep = args.get(1).cloned().unwrap_or_else(|| str_expr(","));
            FunctionMapper::build_func("STRING_AGG", vec![expr, sep])
        })
}
