pub mod quoting;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use minijinja::value::{Rest, Value as TemplateValue, ValueKind};
use minijinja::Environment;
use serde_json::Value;

use crate::error::NodeResult;
use crate::model::ServerType;

pub use quoting::{needs_quoting, qt_ident, qt_literal, qt_type_ident};

/// Version directories, newest first, with the lowest server version each
/// applies to.
pub const VERSION_DIRECTORIES: &[(&str, u32)] = &[
    ("17_plus", 170000),
    ("16_plus", 160000),
    ("15_plus", 150000),
    ("14_plus", 140000),
    ("13_plus", 130000),
    ("12_plus", 120000),
    ("11_plus", 110000),
    ("10_plus", 100000),
    ("9.6_plus", 90600),
    ("9.5_plus", 90500),
    ("9.4_plus", 90400),
    ("9.3_plus", 90300),
    ("9.2_plus", 90200),
    ("9.1_plus", 90100),
    ("9.0_plus", 90000),
    ("default", 0),
];

/// Renders a SQL template with keyword arguments.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, path: &str, context: &Value) -> NodeResult<String>;
}

/// Template directory for an object kind on a given server:
/// `<kind>/#<version>#` or `<kind>/<server_type>/#<version>#`.
pub fn template_path(kind: &str, server_type: Option<ServerType>, version: u32) -> String {
    match server_type {
        Some(server_type) => format!("{}/{}/#{}#", kind, server_type.as_str(), version),
        None => format!("{}/#{}#", kind, version),
    }
}

/// Candidate file paths for a template name, most specific first. Names
/// without a `#<version>#` segment yield themselves only.
pub fn versioned_candidates(name: &str) -> Vec<String> {
    let mut parts = name.splitn(3, '#');
    let (Some(prefix), Some(version), Some(suffix)) = (parts.next(), parts.next(), parts.next())
    else {
        return vec![name.to_string()];
    };
    let Ok(version) = version.parse::<u32>() else {
        return vec![name.to_string()];
    };

    VERSION_DIRECTORIES
        .iter()
        .filter(|(_, min)| *min <= version)
        .map(|(dir, _)| format!("{}{}{}", prefix, dir, suffix))
        .collect()
}

#[derive(Debug, Clone)]
enum TemplateSource {
    Directory(PathBuf),
    Memory(HashMap<String, String>),
}

impl TemplateSource {
    fn read(&self, name: &str) -> Result<Option<String>, minijinja::Error> {
        match self {
            TemplateSource::Memory(sources) => Ok(sources.get(name).cloned()),
            TemplateSource::Directory(root) => {
                let relative = Path::new(name);
                if relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
                {
                    return Ok(None);
                }
                match std::fs::read_to_string(root.join(relative)) {
                    Ok(contents) => Ok(Some(contents)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(minijinja::Error::new(
                        minijinja::ErrorKind::InvalidOperation,
                        format!("could not read template {}", name),
                    )
                    .with_source(e)),
                }
            }
        }
    }

    fn load(&self, name: &str) -> Result<Option<String>, minijinja::Error> {
        for candidate in versioned_candidates(name) {
            if let Some(contents) = self.read(&candidate)? {
                log::debug!("Template {} resolved to {}", name, candidate);
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }
}

/// SQL templates backed by minijinja, resolving `#<version>#` path
/// segments against [`VERSION_DIRECTORIES`].
pub struct SqlTemplates {
    env: Environment<'static>,
}

impl SqlTemplates {
    pub fn from_directory(root: impl Into<PathBuf>) -> Self {
        Self::with_source(TemplateSource::Directory(root.into()))
    }

    pub fn from_sources<K, V>(sources: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_source(TemplateSource::Memory(
            sources
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    fn with_source(source: TemplateSource) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_loader(move |name| source.load(name));

        env.add_filter("qtIdent", qt_ident_filter);
        env.add_filter("qtTypeIdent", qt_type_ident_filter);
        env.add_filter("qtLiteral", qt_literal_filter);
        env.add_function("qtIdent", |args: Rest<TemplateValue>| {
            qt_ident(identifier_parts(&args).iter().map(String::as_str))
        });
        env.add_function("qtTypeIdent", |args: Rest<TemplateValue>| {
            qt_type_ident(identifier_parts(&args).iter().map(String::as_str))
        });

        Self { env }
    }
}

impl TemplateRenderer for SqlTemplates {
    fn render(&self, path: &str, context: &Value) -> NodeResult<String> {
        let template = self.env.get_template(path)?;
        Ok(template.render(context)?)
    }
}

/// Stringify identifier arguments, skipping undefined/none values (such as
/// a `conn` placeholder) and taking the first element of lists.
fn identifier_parts(values: &[TemplateValue]) -> Vec<String> {
    values
        .iter()
        .filter_map(|value| {
            let value = if value.kind() == ValueKind::Seq {
                value.get_item_by_index(0).ok()?
            } else {
                value.clone()
            };
            if value.is_undefined() || value.is_none() {
                return None;
            }
            Some(match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            })
        })
        .collect()
}

fn qt_ident_filter(value: TemplateValue, rest: Rest<TemplateValue>) -> String {
    let mut args = vec![value];
    args.extend(rest.iter().cloned());
    qt_ident(identifier_parts(&args).iter().map(String::as_str))
}

fn qt_type_ident_filter(value: TemplateValue, rest: Rest<TemplateValue>) -> String {
    let mut args = vec![value];
    args.extend(rest.iter().cloned());
    qt_type_ident(identifier_parts(&args).iter().map(String::as_str))
}

/// `{{ data.comment|qtLiteral }}`; extra arguments are ignored.
fn qt_literal_filter(value: TemplateValue, _rest: Rest<TemplateValue>) -> String {
    if value.is_undefined() {
        return "NULL".to_string();
    }
    let json = serde_json::to_value(&value).unwrap_or(Value::Null);
    qt_literal(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_versioned_candidates_descend_from_server_version() {
        let candidates = versioned_candidates("sequences/#90500#/nodes.sql");
        assert_eq!(
            candidates,
            vec![
                "sequences/9.5_plus/nodes.sql",
                "sequences/9.4_plus/nodes.sql",
                "sequences/9.3_plus/nodes.sql",
                "sequences/9.2_plus/nodes.sql",
                "sequences/9.1_plus/nodes.sql",
                "sequences/9.0_plus/nodes.sql",
                "sequences/default/nodes.sql",
            ]
        );
        assert_eq!(versioned_candidates("depends/plain.sql"), vec!["depends/plain.sql"]);
    }

    #[test]
    fn test_template_path_layouts() {
        assert_eq!(template_path("schemas", None, 160002), "schemas/#160002#");
        assert_eq!(
            template_path("functions", Some(ServerType::Ppas), 140000),
            "functions/ppas/#140000#"
        );
    }

    #[test]
    fn test_render_picks_newest_applicable_directory() {
        let templates = SqlTemplates::from_sources([
            ("views/default/nodes.sql", "SELECT 'default'"),
            ("views/12_plus/nodes.sql", "SELECT 'twelve'"),
            ("views/16_plus/nodes.sql", "SELECT 'sixteen'"),
        ]);
        assert_eq!(
            templates.render("views/#150004#/nodes.sql", &json!({})).unwrap(),
            "SELECT 'twelve'"
        );
        assert_eq!(
            templates.render("views/#90600#/nodes.sql", &json!({})).unwrap(),
            "SELECT 'default'"
        );
        assert!(templates.render("views/#150004#/missing.sql", &json!({})).is_err());
    }

    #[test]
    fn test_quoting_filters_in_templates() {
        let templates = SqlTemplates::from_sources([(
            "schemas/default/delete.sql",
            "DROP SCHEMA {{ conn|qtIdent(name) }}{% if cascade %} CASCADE{% endif %}; COMMENT {{ comment|qtLiteral(conn) }} {{ qtTypeIdent('pg_catalog', typ) }}",
        )]);
        let sql = templates
            .render(
                "schemas/#130000#/delete.sql",
                &json!({"name": "Sales", "cascade": true, "comment": "o'k", "typ": "character varying"}),
            )
            .unwrap();
        assert_eq!(
            sql,
            "DROP SCHEMA \"Sales\" CASCADE; COMMENT 'o''k' pg_catalog.character varying"
        );
    }
}
