//! Function argument formatting for the properties panel and grid.

use std::future::Future;

use serde_json::{json, Value};

use crate::error::NodeResult;
use crate::model::Row;

/// Argument grid rows plus the one-line `proargs` display string.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedArguments {
    pub arguments: Vec<Value>,
    pub proargs: String,
}

fn mode_name(mode: &str) -> &'static str {
    match mode {
        "o" => "OUT",
        "b" => "INOUT",
        "v" => "VARIADIC",
        "t" => "TABLE",
        _ => "IN",
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_list(data: &Row, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Array(items)) => items.iter().map(text).collect(),
        _ => Vec::new(),
    }
}

/// Split on commas that are followed by an even number of quote
/// characters, so quoted default values keep their commas.
pub fn split_default_values(defaults: &str) -> Vec<String> {
    let chars: Vec<char> = defaults.chars().collect();
    let mut quotes_after = vec![0usize; chars.len() + 1];
    for idx in (0..chars.len()).rev() {
        let is_quote = matches!(chars[idx], '"' | '\'');
        quotes_after[idx] = quotes_after[idx + 1] + usize::from(is_quote);
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    for (idx, c) in chars.iter().enumerate() {
        if *c == ',' && quotes_after[idx + 1] % 2 == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(*c);
        }
    }
    parts.push(current);
    parts
}

fn display_argument(mode: &str, argtype: &str, name: &str, default: &str) -> String {
    let default = if mode == "INOUT" && default.trim() == "-" {
        ""
    } else {
        default
    };

    let mut arg = String::new();
    for part in [mode, name, argtype] {
        if !part.is_empty() {
            arg.push_str(part);
            arg.push(' ');
        }
    }
    if !default.is_empty() {
        arg.push_str(" DEFAULT ");
        arg.push_str(default);
    }
    arg.trim_matches(' ').to_string()
}

/// Build the argument list of a function from its catalog row.
///
/// `out_type` resolves the type name of an OUT parameter from its entry in
/// `proallargtypes`, which `proargtypenames` does not cover.
pub async fn format_arguments_from_db<F, Fut>(
    data: &Row,
    mut out_type: F,
) -> NodeResult<FormattedArguments>
where
    F: FnMut(Value) -> Fut + Send,
    Fut: Future<Output = NodeResult<String>> + Send,
{
    let mut types: Vec<String> = match data.get("proargtypenames") {
        Some(Value::String(s)) if !s.is_empty() => s.split(',').map(String::from).collect(),
        Some(Value::Array(items)) => items.iter().map(text).collect(),
        _ => Vec::new(),
    };
    let modes = match string_list(data, "proargmodes") {
        modes if modes.is_empty() => vec!["i".to_string(); types.len()],
        modes => modes,
    };
    let mut names = string_list(data, "proargnames");
    let mut defaults: Vec<String> = match data.get("proargdefaultvals") {
        Some(Value::String(s)) if !s.is_empty() => split_default_values(s),
        Some(Value::Array(items)) => items.iter().map(text).collect(),
        _ => Vec::new(),
    };
    let all_types = match data.get("proallargtypes") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    // Defaults belong to the trailing parameters.
    let total_defaults = defaults.len();
    if total_defaults > 0 && types.len() > total_defaults {
        let missing = types.len() - total_defaults;
        defaults.splice(0..0, std::iter::repeat(String::new()).take(missing));
    }

    let mut modes_filtered = modes.clone();
    let mut table_names = Vec::new();
    for (cnt, mode) in modes.iter().enumerate() {
        match mode.as_str() {
            "o" => {
                let oid = all_types.get(cnt).cloned().unwrap_or(Value::Null);
                let out = out_type(oid).await?;
                types.insert(cnt.min(types.len()), out);
                defaults.insert(cnt.min(defaults.len()), String::new());
            }
            "v" => defaults.insert(cnt.min(defaults.len()), String::new()),
            "t" => {
                if let Some(pos) = modes_filtered.iter().position(|m| m == "t") {
                    modes_filtered.remove(pos);
                }
                table_names.push(names.get(cnt).cloned().unwrap_or_default());
            }
            _ => {}
        }
    }

    let modes_filtered: Vec<&str> = modes_filtered.iter().map(|m| mode_name(m)).collect();
    for name in &table_names {
        if let Some(pos) = names.iter().position(|n| n == name) {
            names.remove(pos);
        }
    }

    if modes_filtered.len() > defaults.len() {
        let missing = modes_filtered.len() - defaults.len();
        defaults.splice(0..0, std::iter::repeat(String::new()).take(missing));
    }

    let field = |list: &[String], idx: usize| list.get(idx).cloned().unwrap_or_default();
    let mut arguments = Vec::with_capacity(types.len());
    let mut display = Vec::with_capacity(types.len());
    for idx in 0..types.len() {
        let mode = modes_filtered.get(idx).copied().unwrap_or("");
        let argtype = field(&types, idx);
        let name = field(&names, idx);
        let mut default = field(&defaults, idx);

        display.push(display_argument(mode, &argtype, &name, &default));

        if mode == "INOUT" && default.trim() == "-" {
            default.clear();
        }
        arguments.push(json!({
            "argid": idx,
            "argtype": argtype.trim(),
            "argmode": mode,
            "argname": name,
            "argdefval": default,
        }));
    }

    Ok(FormattedArguments {
        arguments,
        proargs: display.join(", "),
    })
}
