//! Object type modules. Each one pairs a static [`NodeDef`] with a
//! [`NodeView`] implementation overriding the verbs its catalog needs.
//!
//! [`NodeDef`]: crate::logic::node::NodeDef
//! [`NodeView`]: crate::logic::view::NodeView

pub mod collation;
pub mod dbms;
pub mod fts;
pub mod function;
pub mod schema;
pub mod sequence;
pub mod types;
pub mod views;

use crate::logic::registry::NodeRegistry;

pub use collation::CollationView;
pub use dbms::{DbmsJobView, DbmsProgramView, DbmsScheduleView};
pub use fts::{FtsKind, FtsView};
pub use function::FunctionView;
pub use schema::SchemaView;
pub use sequence::SequenceView;
pub use types::TypeView;
pub use views::RelationView;

/// All node views. Registration order is the order schema diff compares
/// object types in.
pub fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(SchemaView);
    registry.register(CollationView);
    registry.register(FunctionView);
    registry.register(SequenceView);
    registry.register(TypeView);
    registry.register(RelationView::view());
    registry.register(RelationView::materialized());
    registry.register(FtsView::new(FtsKind::Configuration));
    registry.register(FtsView::new(FtsKind::Dictionary));
    registry.register(FtsView::new(FtsKind::Parser));
    registry.register(FtsView::new(FtsKind::Template));
    registry.register(DbmsJobView);
    registry.register(DbmsProgramView);
    registry.register(DbmsScheduleView);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::node::ParentLevel;
    use crate::model::{ServerInfo, ServerType};

    fn info(server_type: ServerType, version: u32) -> ServerInfo {
        ServerInfo {
            sid: 1,
            version,
            server_type,
        }
    }

    #[test]
    fn test_node_types_are_unique() {
        let registry = registry();
        let mut types: Vec<_> = registry.views().iter().map(|v| v.def().node_type).collect();
        let total = types.len();
        types.sort();
        types.dedup();
        assert_eq!(types.len(), total);
        assert!(registry.get("fts_dictionary").is_some());
        assert!(registry.get("table").is_none());
    }

    #[test]
    fn test_schema_children_depend_on_server() {
        let registry = registry();
        let pg = registry.collection_nodes(ParentLevel::Schema, &info(ServerType::Pg, 90200), 2200);
        let labels: Vec<_> = pg.iter().map(|n| n.label.as_str()).collect();
        assert!(labels.contains(&"Collations"));
        assert!(!labels.contains(&"Materialized Views"));

        let scheduler = registry.collection_nodes(ParentLevel::JobScheduler, &info(ServerType::Pg, 160000), 999999);
        assert!(scheduler.is_empty());
        let scheduler = registry.collection_nodes(ParentLevel::JobScheduler, &info(ServerType::Ppas, 160000), 999999);
        assert_eq!(scheduler.len(), 3);
    }

    #[test]
    fn test_diff_order_follows_registration() {
        let registry = registry();
        let order: Vec<_> = registry
            .diff_views(&info(ServerType::Pg, 160000))
            .iter()
            .map(|v| v.def().node_type)
            .collect();
        assert_eq!(order.first(), Some(&"collation"));
        assert_eq!(order.last(), Some(&"fts_template"));
        assert!(!order.contains(&"schema"));
    }
}
