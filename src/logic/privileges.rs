//! Conversion of ACL rows and privilege form data.

use serde_json::{json, Value};

use crate::model::{row_str, Row};
use crate::templates::qt_ident;

/// Privilege letters as they appear in `aclitem` text.
const PRIVILEGE_NAMES: &[(&str, &str)] = &[
    ("c", "CONNECT"),
    ("C", "CREATE"),
    ("T", "TEMPORARY"),
    ("a", "INSERT"),
    ("r", "SELECT"),
    ("w", "UPDATE"),
    ("d", "DELETE"),
    ("D", "TRUNCATE"),
    ("x", "REFERENCES"),
    ("t", "TRIGGER"),
    ("U", "USAGE"),
    ("X", "EXECUTE"),
];

fn privilege_name(code: &str) -> Option<&'static str> {
    PRIVILEGE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Turn one `acl.sql` row (`grantor`, `grantee`, `privileges[]`,
/// `grantable[]`) into the structure the privilege grid edits.
pub fn parse_priv_from_db(row: &Row) -> Value {
    let codes = row
        .get("privileges")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let grantable = row
        .get("grantable")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let privileges: Vec<Value> = codes
        .iter()
        .enumerate()
        .map(|(idx, code)| {
            let with_grant = match grantable.get(idx) {
                Some(Value::Bool(b)) => *b,
                Some(Value::String(s)) => s == "t" || s == "true",
                _ => false,
            };
            json!({
                "privilege_type": code,
                "privilege": true,
                "with_grant": with_grant,
            })
        })
        .collect();

    json!({
        "grantor": row.get("grantor").cloned().unwrap_or(Value::Null),
        "grantee": row.get("grantee").cloned().unwrap_or(Value::Null),
        "privileges": privileges,
    })
}

/// Group `acl.sql` rows by their `deftype` column, e.g. `nspacl` or
/// `deftblacl`.
pub fn group_privileges_by_type(rows: &[Row]) -> Row {
    let mut grouped = Row::new();
    for row in rows {
        let Some(deftype) = row_str(row, "deftype") else {
            continue;
        };
        let entry = grouped
            .entry(deftype.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(parse_priv_from_db(row));
        }
    }
    grouped
}

fn quoted_grantee(grantee: &str) -> String {
    if grantee == "PUBLIC" {
        grantee.to_string()
    } else {
        qt_ident([grantee])
    }
}

/// Turn privilege grid rows into grant lists for the templates.
///
/// Only codes in `allowed` survive. When every allowed privilege is
/// granted (and there is more than one) the list collapses to `ALL`.
pub fn parse_priv_to_db(entries: &[Value], allowed: &[&str]) -> Vec<Value> {
    entries
        .iter()
        .filter_map(Value::as_object)
        .map(|entry| {
            let mut with_grant = Vec::new();
            let mut without_grant = Vec::new();

            let privileges = entry
                .get("privileges")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for privilege in privileges.iter().filter_map(Value::as_object) {
                let Some(code) = privilege.get("privilege_type").and_then(Value::as_str) else {
                    continue;
                };
                let Some(name) = privilege_name(code) else {
                    continue;
                };
                if !allowed.contains(&code) {
                    continue;
                }
                if truthy(privilege.get("with_grant")) {
                    with_grant.push(name.to_string());
                } else if truthy(privilege.get("privilege")) {
                    without_grant.push(name.to_string());
                }
            }

            if allowed.len() > 1 && with_grant.len() == allowed.len() {
                with_grant = vec!["ALL".to_string()];
            }
            if allowed.len() > 1 && without_grant.len() == allowed.len() {
                without_grant = vec!["ALL".to_string()];
            }

            let grantee = quoted_grantee(row_str(entry, "grantee").unwrap_or("PUBLIC"));
            let old_grantee = match row_str(entry, "old_grantee") {
                Some(old) => quoted_grantee(old),
                None => grantee.clone(),
            };

            json!({
                "grantee": grantee,
                "grantor": entry.get("grantor").cloned().unwrap_or(Value::Null),
                "old_grantee": old_grantee,
                "with_grant": with_grant,
                "without_grant": without_grant,
            })
        })
        .collect()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true" || s == "t",
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// Rewrite the privilege keys of form data in place.
///
/// With `modified` the key holds `{added, changed, deleted}` lists (an
/// update); otherwise it holds a plain list (a create).
pub fn format_request_acls(data: &mut Row, acls: &[(&str, &[&str])], modified: bool) {
    for (key, allowed) in acls {
        let Some(value) = data.get_mut(*key) else {
            continue;
        };
        if modified {
            if let Value::Object(changes) = value {
                for mode in ["added", "changed", "deleted"] {
                    if let Some(Value::Array(entries)) = changes.get(mode) {
                        let parsed = parse_priv_to_db(entries, allowed);
                        changes.insert(mode.to_string(), Value::Array(parsed));
                    }
                }
            }
        } else if let Value::Array(entries) = value {
            *value = Value::Array(parse_priv_to_db(entries, allowed));
        }
    }
}

/// `provider=label` strings into `[{provider, label}]`.
pub fn parse_security_labels(row: &Row, key: &str) -> Option<Vec<Value>> {
    let labels = row.get(key)?.as_array()?;
    Some(
        labels
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|entry| {
                let (provider, label) = entry.split_once('=')?;
                Some(json!({"provider": provider, "label": label}))
            })
            .collect(),
    )
}

/// `name=value` configuration entries into `[{name, value}]`; `off` and
/// `false` become a JSON `false`.
pub fn parse_variables(config: &[Value]) -> Vec<Value> {
    config
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|entry| {
            let (name, value) = entry.split_once('=')?;
            let value = match value {
                "false" | "off" => Value::Bool(false),
                other => Value::String(other.to_string()),
            };
            Some(json!({"name": name, "value": value}))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_priv_from_db() {
        let acl = parse_priv_from_db(&row(json!({
            "deftype": "nspacl",
            "grantor": "postgres",
            "grantee": "app",
            "privileges": ["C", "U"],
            "grantable": [false, true],
        })));
        assert_eq!(
            acl,
            json!({
                "grantor": "postgres",
                "grantee": "app",
                "privileges": [
                    {"privilege_type": "C", "privilege": true, "with_grant": false},
                    {"privilege_type": "U", "privilege": true, "with_grant": true},
                ]
            })
        );
    }

    #[test]
    fn test_group_by_deftype() {
        let rows = vec![
            row(json!({"deftype": "nspacl", "grantee": "a", "privileges": ["U"], "grantable": [false]})),
            row(json!({"deftype": "deftblacl", "grantee": "b", "privileges": ["r"], "grantable": [false]})),
            row(json!({"deftype": "nspacl", "grantee": "c", "privileges": ["C"], "grantable": [false]})),
        ];
        let grouped = group_privileges_by_type(&rows);
        assert_eq!(grouped["nspacl"].as_array().unwrap().len(), 2);
        assert_eq!(grouped["deftblacl"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_priv_to_db_collapses_to_all() {
        let entries = vec![json!({
            "grantee": "App User",
            "grantor": "postgres",
            "privileges": [
                {"privilege_type": "C", "privilege": true, "with_grant": false},
                {"privilege_type": "U", "privilege": true, "with_grant": false},
                {"privilege_type": "X", "privilege": true, "with_grant": false},
            ]
        })];
        let parsed = parse_priv_to_db(&entries, &["C", "U"]);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["grantee"], json!("\"App User\""));
        assert_eq!(parsed[0]["without_grant"], json!(["ALL"]));
        assert_eq!(parsed[0]["with_grant"], json!([]));
    }

    #[test]
    fn test_parse_priv_to_db_single_allowed_never_collapses() {
        let entries = vec![json!({
            "grantee": "PUBLIC",
            "privileges": [{"privilege_type": "X", "privilege": true, "with_grant": true}]
        })];
        let parsed = parse_priv_to_db(&entries, &["X"]);
        assert_eq!(parsed[0]["grantee"], json!("PUBLIC"));
        assert_eq!(parsed[0]["with_grant"], json!(["EXECUTE"]));
    }

    #[test]
    fn test_format_request_acls_modified() {
        let mut data = row(json!({
            "nspacl": {
                "added": [{"grantee": "bob", "privileges": [{"privilege_type": "U", "privilege": true, "with_grant": false}]}],
                "deleted": [{"grantee": "eve", "privileges": [{"privilege_type": "C", "privilege": true, "with_grant": false}]}]
            }
        }));
        format_request_acls(&mut data, &[("nspacl", &["C", "U"])], true);
        assert_eq!(data["nspacl"]["added"][0]["without_grant"], json!(["USAGE"]));
        assert_eq!(data["nspacl"]["deleted"][0]["without_grant"], json!(["CREATE"]));
        assert!(data["nspacl"].get("changed").is_none());
    }

    #[test]
    fn test_security_labels_and_variables() {
        let labels = parse_security_labels(
            &row(json!({"seclabels": ["selinux=system_u:object_r:sepgsql_table_t:s0"]})),
            "seclabels",
        )
        .unwrap();
        assert_eq!(
            labels,
            vec![json!({"provider": "selinux", "label": "system_u:object_r:sepgsql_table_t:s0"})]
        );

        let vars = parse_variables(&[json!("search_path=public"), json!("enable_seqscan=off")]);
        assert_eq!(
            vars,
            vec![
                json!({"name": "search_path", "value": "public"}),
                json!({"name": "enable_seqscan", "value": false}),
            ]
        );
    }
}
