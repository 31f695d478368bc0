//! Identifier and literal quoting for generated DDL.

use itertools::Itertools;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeywordCategory {
    ColName,
    TypeFuncName,
    Reserved,
}

const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "system_user", "table", "then",
    "to", "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
    // Advanced Server and Greenplum words that break unquoted identifiers.
    "connect", "convert", "exec", "long", "minus", "nocache", "number", "package",
    "pls_integer", "raw", "return", "smalldatetime", "smallfloat", "smallmoney", "sysdate",
    "systimestap", "tinyint", "tinytext", "varchar2",
];

const TYPE_FUNC_NAME: &[&str] = &[
    "authorization", "binary", "collation", "concurrently", "cross", "current_schema",
    "freeze", "full", "ilike", "inner", "is", "isnull", "join", "left", "like", "natural",
    "notnull", "outer", "overlaps", "right", "similar", "tablesample", "verbose",
];

const COL_NAME: &[&str] = &[
    "between", "bigint", "bit", "boolean", "char", "character", "coalesce", "dec", "decimal",
    "exists", "extract", "float", "greatest", "grouping", "inout", "int", "integer",
    "interval", "json", "json_array", "json_arrayagg", "json_object", "json_objectagg",
    "json_scalar", "json_serialize", "least", "national", "nchar", "none", "normalize",
    "nullif", "numeric", "out", "overlay", "position", "precision", "real", "row", "setof",
    "smallint", "substring", "time", "timestamp", "treat", "trim", "values", "varchar",
    "xmlattributes", "xmlconcat", "xmlelement", "xmlexists", "xmlforest", "xmlnamespaces",
    "xmlparse", "xmlpi", "xmlroot", "xmlserialize", "xmltable",
];

/// Type names that contain spaces or quotes yet must be emitted verbatim.
const VERBATIM_TYPES: &[&str] = &[
    "bit varying",
    "\"char\"",
    "character varying",
    "double precision",
    "timestamp without time zone",
    "timestamp with time zone",
    "time without time zone",
    "time with time zone",
    "\"trigger\"",
    "\"unknown\"",
];

fn keyword_category(word: &str) -> Option<KeywordCategory> {
    if RESERVED.contains(&word) {
        Some(KeywordCategory::Reserved)
    } else if TYPE_FUNC_NAME.contains(&word) {
        Some(KeywordCategory::TypeFuncName)
    } else if COL_NAME.contains(&word) {
        Some(KeywordCategory::ColName)
    } else {
        None
    }
}

/// Whether `value` must be double-quoted to be used as an identifier
/// (or, with `for_types`, as a type name).
pub fn needs_quoting(value: &str, for_types: bool) -> bool {
    let mut bare = value;
    if for_types {
        if let Some(stripped) = bare.strip_suffix("[]") {
            bare = stripped;
        }
        if VERBATIM_TYPES.contains(&bare.to_lowercase().as_str()) {
            return false;
        }
        if bare.starts_with('"') || bare.ends_with('"') {
            return false;
        }
    }

    match bare.chars().next() {
        None => return false,
        Some(c) if c.is_ascii_digit() => return true,
        _ => {}
    }
    if bare
        .chars()
        .any(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
    {
        return true;
    }

    match keyword_category(bare) {
        None => false,
        Some(KeywordCategory::ColName) if for_types => false,
        Some(_) => true,
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn join_parts<'a>(parts: impl IntoIterator<Item = &'a str>, for_types: bool) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|p| {
            if needs_quoting(p, for_types) {
                quote(p)
            } else {
                p.to_string()
            }
        })
        .join(".")
}

/// Quote and dot-join identifier parts, e.g. `["public", "Order"]` into
/// `public."Order"`.
pub fn qt_ident<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    join_parts(parts, false)
}

/// Like [`qt_ident`] but leaves built-in multi-word type names alone.
pub fn qt_type_ident<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    join_parts(parts, true)
}

/// Render a JSON value as an SQL literal.
pub fn qt_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        Value::Array(items) => format!(
            "ARRAY[{}]",
            items.iter().map(qt_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(_) => quote_string(&value.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    let escaped = s.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}
