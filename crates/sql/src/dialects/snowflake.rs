//! Snowflake function translations.

use super::function_mapper::{null_expr, str_expr};
use super::FunctionMapper;

pub fn snowflake_function_rules() -> FunctionMapper {
    FunctionMapper::new()
        .rename("ifnull", "NVL")
        .rename("char_length", "LENGTH")
        .rename("character_length", "LENGTH")
        .rename("group_concat", "LISTAGG")
        .transform("string_agg", |args| {
            let expr = args.first().cloned().unwrap_or_else(null_expr);
            let sep = args.get(1).cloned().unwrap_or_else(|| str_expr(","));
            FunctionMapper::build_func("LISTAGG", vec![expr, sep])
        })
        .transform("now", |_| FunctionMapper::build_keyword_func("CURRENT_TIMESTAMP"))
        .transform("from_unixtime", |args| {
            let ts = args.first().cloned().unwrap_or_else(null_expr);
            FunctionMapper::build_func("TO_TIMESTAMP", vec![ts])
        })
}
