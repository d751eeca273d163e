//! SQLite function translations.

use super::function_mapper::{null_expr, str_expr};
use super::FunctionMapper;

pub fn sqlite_function_rules() -> FunctionMapper {
    FunctionMapper::new()
        .rename("nvl", "IFNULL")
        .rename("len", "LENGTH")
        .rename("char_length", "LENGTH")
        .rename("substring", "SUBSTR")
        .rename("array_agg", "JSON_GROUP_ARRAY")
        .transform("string_agg", |args| {
            let expr = args.first().cloned().unwrap_or_else(null_expr);
            let sep = args.get(1).cloned().unwrap_or_else(|| str_expr(","));
            FunctionMapper::build_func("GROUP_CONCAT", vec![expr, sep])
        })
        .transform("listagg", |args| {
            let expr = args.first().cloned().unwrap_or_else(null_expr);
            let sep = args.get(1).cloned().unwrap_or_else(|| str_expr(","));
            FunctionMapper::build_func("GROUP_CONCAT", vec![expr, sep])
        })
        .transform("now", |_| {
            FunctionMapper::build_func("DATETIME", vec![str_expr("now")])
        })
        .transform("getdate", |_| {
            FunctionMapper::build_func("DATETIME", vec![str_expr("now")])
        })
}
