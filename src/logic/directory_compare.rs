//! Recursive comparison of fetched object properties.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use crate::model::{row_oid, ComparisonItem, ComparisonStatus, Row};

/// Keys that identify an element of a list of objects, e.g. columns or
/// privilege grantees.
const LIST_IDENTITY_KEYS: &[&str] = &["name", "colname", "grantee"];

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Compare strings with all whitespace removed.
    pub ignore_whitespaces: bool,
}

/// Hands out comparison row ids for one compare run.
#[derive(Debug, Default)]
pub struct ItemCounter {
    next: u64,
}

impl ItemCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    fn take(&mut self) -> u64 {
        let id = self.next.max(1);
        self.next = id + 1;
        id
    }
}

fn strip_ignored(row: &Row, ignore_keys: &[&str]) -> Row {
    row.iter()
        .filter(|(key, _)| !ignore_keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Partition two `name -> properties` maps into source-only, target-only,
/// different and identical items, each group sorted by title.
pub fn compare_dictionaries(
    source: &BTreeMap<String, Row>,
    target: &BTreeMap<String, Row>,
    node_type: &str,
    label: &str,
    ignore_keys: &[&str],
    options: CompareOptions,
    counter: &mut ItemCounter,
) -> Vec<ComparisonItem> {
    let item = |counter: &mut ItemCounter,
                title: &str,
                oid: u32,
                pair: Option<(u32, u32)>,
                status: ComparisonStatus| ComparisonItem {
        id: counter.take(),
        node_type: node_type.to_string(),
        label: label.to_string(),
        title: title.to_string(),
        oid,
        source_oid: pair.map(|(s, _)| s),
        target_oid: pair.map(|(_, t)| t),
        status,
    };

    // BTreeMap iteration already yields titles in order.
    let mut source_only = Vec::new();
    for (title, props) in source.iter().filter(|(k, _)| !target.contains_key(*k)) {
        let oid = row_oid(props, "oid").unwrap_or_default();
        source_only.push(item(counter, title, oid, None, ComparisonStatus::SourceOnly));
    }

    let mut target_only = Vec::new();
    for (title, props) in target.iter().filter(|(k, _)| !source.contains_key(*k)) {
        let oid = row_oid(props, "oid").unwrap_or_default();
        target_only.push(item(counter, title, oid, None, ComparisonStatus::TargetOnly));
    }

    let mut different = Vec::new();
    let mut identical = Vec::new();
    for (title, source_props) in source.iter() {
        let Some(target_props) = target.get(title) else {
            continue;
        };
        let source_oid = row_oid(source_props, "oid").unwrap_or_default();
        let target_oid = row_oid(target_props, "oid").unwrap_or_default();
        let pair = Some((source_oid, target_oid));

        if are_dictionaries_identical(source_props, target_props, ignore_keys, options) {
            identical.push(item(counter, title, source_oid, pair, ComparisonStatus::Identical));
        } else {
            different.push(item(counter, title, source_oid, pair, ComparisonStatus::Different));
        }
    }

    let mut items = source_only;
    items.extend(target_only);
    items.extend(different);
    items.extend(identical);
    items
}

fn scalars_equal(source: &Value, target: &Value, options: CompareOptions) -> bool {
    match (source, target) {
        (Value::String(a), Value::String(b)) if options.ignore_whitespaces => {
            a.chars().filter(|c| !c.is_whitespace()).eq(b.chars().filter(|c| !c.is_whitespace()))
        }
        _ => source == target,
    }
}

fn values_identical(source: &Value, target: &Value, ignore_keys: &[&str], options: CompareOptions) -> bool {
    match (source, target) {
        (Value::Object(a), Value::Object(b)) => are_dictionaries_identical(a, b, ignore_keys, options),
        (Value::Array(a), Value::Array(b)) => are_lists_identical(a, b, ignore_keys, options),
        _ => scalars_equal(source, target, options),
    }
}

/// Element-wise comparison; lists of different length differ.
pub fn are_lists_identical(
    source: &[Value],
    target: &[Value],
    ignore_keys: &[&str],
    options: CompareOptions,
) -> bool {
    source.len() == target.len()
        && source
            .iter()
            .zip(target)
            .all(|(a, b)| values_identical(a, b, ignore_keys, options))
}

/// Recursive comparison ignoring `ignore_keys` at every level. Differing
/// key sets are never identical.
pub fn are_dictionaries_identical(
    source: &Row,
    target: &Row,
    ignore_keys: &[&str],
    options: CompareOptions,
) -> bool {
    let source = strip_ignored(source, ignore_keys);
    let target = strip_ignored(target, ignore_keys);

    let source_keys: BTreeSet<&String> = source.keys().collect();
    let target_keys: BTreeSet<&String> = target.keys().collect();
    if source_keys != target_keys {
        return false;
    }

    source.iter().all(|(key, value)| match target.get(key) {
        Some(other) => values_identical(value, other, ignore_keys, options),
        None => false,
    })
}

fn identity_of(value: &Value) -> Option<(&'static str, &Value)> {
    let object = value.as_object()?;
    LIST_IDENTITY_KEYS
        .iter()
        .find_map(|key| object.get(*key).map(|v| (*key, v)))
}

fn is_named_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|item| identity_of(item).is_some())
}

/// Split two lists of named objects into `{added, changed, deleted}`.
/// Returns `None` when nothing moved.
fn diff_named_list(source: &[Value], target: &[Value]) -> Option<Value> {
    let mut added = Vec::new();
    let mut changed = Vec::new();
    let mut remaining: Vec<&Value> = target.iter().collect();

    for item in source {
        let identity = identity_of(item);
        let matched = remaining
            .iter()
            .position(|candidate| identity.is_some() && identity_of(candidate) == identity);
        match matched {
            Some(pos) => {
                let other = remaining.remove(pos);
                if other != item {
                    changed.push(item.clone());
                }
            }
            None => added.push(item.clone()),
        }
    }
    let deleted: Vec<Value> = remaining.into_iter().cloned().collect();

    if added.is_empty() && changed.is_empty() && deleted.is_empty() {
        return None;
    }
    Some(json!({"added": added, "changed": changed, "deleted": deleted}))
}

fn diff_into(source: &Row, target: &Row, ignore_keys: &[&str], difference: &mut Row) {
    for (key, value) in source {
        if ignore_keys.contains(&key.as_str()) {
            continue;
        }
        let Some(other) = target.get(key) else {
            // only source-side lists carry over, as additions
            if let Value::Array(items) = value {
                difference.insert(key.clone(), json!({"added": items}));
            }
            continue;
        };

        match (value, other) {
            (Value::Object(source_inner), Value::Object(target_inner)) => {
                diff_into(source_inner, target_inner, ignore_keys, difference);
            }
            (Value::Array(source_items), Value::Array(target_items))
                if is_named_list(source_items) || is_named_list(target_items) =>
            {
                if let Some(changes) = diff_named_list(source_items, target_items) {
                    difference.insert(key.clone(), changes);
                }
            }
            _ => {
                if value != other {
                    difference.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// The changes that turn `target` into `source`, shaped like update form
/// data. Nested objects are flattened into the same map. Keys present only
/// in the target are left alone, and of the keys present only in the
/// source just lists are kept, as `{added: [...]}`.
pub fn directory_diff(source: &Row, target: &Row, ignore_keys: &[&str]) -> Row {
    let mut difference = Row::new();
    diff_into(source, target, ignore_keys, &mut difference);
    difference
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn objects(entries: Vec<(&str, Value)>) -> BTreeMap<String, Row> {
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), row(value)))
            .collect()
    }

    #[test]
    fn test_compare_partitions_and_orders_groups() {
        let source = objects(vec![
            ("zeta", json!({"oid": 1, "cache": 1})),
            ("alpha", json!({"oid": 2, "cache": 1})),
            ("same", json!({"oid": 3, "cache": 1})),
            ("changed", json!({"oid": 4, "cache": 1})),
        ]);
        let target = objects(vec![
            ("same", json!({"oid": 30, "cache": 1})),
            ("changed", json!({"oid": 40, "cache": 20})),
            ("gone", json!({"oid": 50, "cache": 1})),
        ]);
        let mut counter = ItemCounter::new();
        let items = compare_dictionaries(
            &source,
            &target,
            "sequence",
            "Sequences",
            &["oid"],
            CompareOptions::default(),
            &mut counter,
        );

        let summary: Vec<(&str, ComparisonStatus)> =
            items.iter().map(|i| (i.title.as_str(), i.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("alpha", ComparisonStatus::SourceOnly),
                ("zeta", ComparisonStatus::SourceOnly),
                ("gone", ComparisonStatus::TargetOnly),
                ("changed", ComparisonStatus::Different),
                ("same", ComparisonStatus::Identical),
            ]
        );
        let ids: Vec<u64> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        assert_eq!(items[0].source_oid, None);
        assert_eq!(items[2].oid, 50);
        assert_eq!(items[3].source_oid, Some(4));
        assert_eq!(items[3].target_oid, Some(40));
    }

    #[test]
    fn test_counter_continues_across_nodes() {
        let mut counter = ItemCounter::new();
        let one = objects(vec![("a", json!({"oid": 1}))]);
        let empty = BTreeMap::new();
        let first = compare_dictionaries(&one, &empty, "type", "Types", &[], CompareOptions::default(), &mut counter);
        let second = compare_dictionaries(&empty, &one, "view", "Views", &[], CompareOptions::default(), &mut counter);
        assert_eq!(first[0].id, 1);
        assert_eq!(second[0].id, 2);
    }

    #[test]
    fn test_identical_ignores_keys_at_every_level() {
        let a = row(json!({"oid": 1, "acl": [{"grantee": "x", "oid": 5}], "opts": {"oid": 7, "fill": 90}}));
        let b = row(json!({"oid": 2, "acl": [{"grantee": "x", "oid": 6}], "opts": {"oid": 8, "fill": 90}}));
        assert!(are_dictionaries_identical(&a, &b, &["oid"], CompareOptions::default()));

        let c = row(json!({"oid": 1, "extra": true}));
        let d = row(json!({"oid": 1}));
        assert!(!are_dictionaries_identical(&c, &d, &[], CompareOptions::default()));
    }

    #[test]
    fn test_whitespace_insensitive_strings() {
        let a = row(json!({"definition": "SELECT 1\n  FROM t"}));
        let b = row(json!({"definition": "SELECT 1 FROM t"}));
        assert!(!are_dictionaries_identical(&a, &b, &[], CompareOptions::default()));
        assert!(are_dictionaries_identical(
            &a,
            &b,
            &[],
            CompareOptions { ignore_whitespaces: true }
        ));
    }

    #[test]
    fn test_lists_of_different_length_differ() {
        assert!(!are_lists_identical(&[json!(1)], &[json!(1), json!(2)], &[], CompareOptions::default()));
        assert!(are_lists_identical(&[json!("a")], &[json!("a")], &[], CompareOptions::default()));
    }

    #[test]
    fn test_directory_diff_scalars_and_nested() {
        let source = row(json!({"oid": 1, "increment": 5, "owner": "app", "options": {"fillfactor": 70}}));
        let target = row(json!({"oid": 9, "increment": 1, "owner": "app", "options": {"fillfactor": 100}, "only_target": 1}));
        let diff = directory_diff(&source, &target, &["oid"]);
        assert_eq!(diff, row(json!({"increment": 5, "fillfactor": 70})));
    }

    #[test]
    fn test_directory_diff_named_lists() {
        let source = row(json!({
            "acl": [
                {"grantee": "alice", "privileges": ["U"]},
                {"grantee": "bob", "privileges": ["C", "U"]},
            ],
            "labels": ["a", "b"],
        }));
        let target = row(json!({
            "acl": [
                {"grantee": "bob", "privileges": ["U"]},
                {"grantee": "carol", "privileges": ["U"]},
            ],
            "labels": ["a"],
        }));
        let diff = directory_diff(&source, &target, &[]);
        assert_eq!(
            diff["acl"],
            json!({
                "added": [{"grantee": "alice", "privileges": ["U"]}],
                "changed": [{"grantee": "bob", "privileges": ["C", "U"]}],
                "deleted": [{"grantee": "carol", "privileges": ["U"]}],
            })
        );
        assert_eq!(diff["labels"], json!(["a", "b"]));
    }

    #[test]
    fn test_directory_diff_omits_unchanged_lists_and_adds_source_only() {
        let source = row(json!({"columns": [{"name": "id"}], "seclabels": [{"provider": "p", "label": "l"}]}));
        let target = row(json!({"columns": [{"name": "id"}]}));
        let diff = directory_diff(&source, &target, &[]);
        assert!(diff.get("columns").is_none());
        assert_eq!(diff["seclabels"], json!({"added": [{"provider": "p", "label": "l"}]}));
    }

    #[test]
    fn test_directory_diff_skips_source_only_scalars() {
        let source = row(json!({"name": "seq", "comment": "ids", "cycled": true, "options": {"cache": 1}}));
        let target = row(json!({"name": "seq"}));
        let diff = directory_diff(&source, &target, &[]);
        assert!(diff.is_empty());

        let source = row(json!({"name": "seq", "comment": "ids", "variables": [{"name": "search_path"}]}));
        let diff = directory_diff(&source, &target, &[]);
        assert_eq!(diff, row(json!({"variables": {"added": [{"name": "search_path"}]}})));
    }

    #[test]
    fn test_directory_diff_is_fresh_per_call() {
        let source = row(json!({"a": 1}));
        let target = row(json!({"a": 2}));
        assert_eq!(directory_diff(&source, &target, &[]).len(), 1);
        let same = row(json!({"b": 1}));
        assert!(directory_diff(&same, &same, &[]).is_empty());
    }
}
