//! MySQL / MariaDB function translations.

use super::FunctionMapper;

pub fn mysql_function_rules() -> FunctionMapper {
    FunctionMapper::new()
        .rename("nvl", "IFNULL")
        .rename("isnull", "IFNULL")
        // LENGTH counts bytes in MySQL.
        .rename("length", "CHAR_LENGTH")
        .rename("len", "CHAR_LENGTH")
        .rename("getdate", "NOW")
        .rename("json_group_array", "JSON_ARRAYAGG")
        .rename("array_agg", "JSON_ARRAYAGG")
}
