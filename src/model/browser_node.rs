use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Oid, Row};

/// An entry of the object tree as the browser client renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserNode {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub inode: bool,
    #[serde(rename = "_type")]
    pub node_type: String,
    #[serde(rename = "_id")]
    pub node_id: Oid,
    #[serde(rename = "_pid")]
    pub parent_id: Oid,
    pub module: String,
    #[serde(flatten)]
    pub extras: Row,
}

impl BrowserNode {
    pub fn new(
        node_type: &str,
        node_id: Oid,
        parent_id: Oid,
        label: impl Into<String>,
        icon: impl Into<String>,
        inode: bool,
    ) -> Self {
        Self {
            id: format!("{}_{}", node_type, node_id),
            label: label.into(),
            icon: icon.into(),
            inode,
            node_type: node_type.to_string(),
            node_id,
            parent_id,
            module: format!("pgadmin.node.{}", node_type),
            extras: Row::new(),
        }
    }

    /// The collection entry a module contributes below its parent.
    pub fn collection(node_type: &str, label: impl Into<String>, parent_id: Oid) -> Self {
        Self {
            id: format!("coll-{}", node_type),
            label: label.into(),
            icon: format!("icon-coll-{}", node_type),
            inode: true,
            node_type: format!("coll-{}", node_type),
            node_id: parent_id,
            parent_id,
            module: format!("pgadmin.node.{}", node_type),
            extras: Row::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_node_shape() {
        let node = BrowserNode::new("sequence", 16420, 2200, "order_seq", "icon-sequence", false)
            .with_extra("description", "ids");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "sequence_16420",
                "label": "order_seq",
                "icon": "icon-sequence",
                "inode": false,
                "_type": "sequence",
                "_id": 16420,
                "_pid": 2200,
                "module": "pgadmin.node.sequence",
                "description": "ids"
            })
        );
    }

    #[test]
    fn test_collection_node_shape() {
        let node = BrowserNode::collection("collation", "Collations", 2200);
        assert_eq!(node.id, "coll-collation");
        assert_eq!(node.icon, "icon-coll-collation");
        assert_eq!(node.node_type, "coll-collation");
        assert!(node.inode);
        assert_eq!(node.node_id, 2200);
        assert_eq!(node.module, "pgadmin.node.collation");
    }
}
