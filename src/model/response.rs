use serde_json::Value;

use crate::model::BrowserNode;

/// Successful outcome of a node verb, before it is wrapped in the HTTP
/// envelope the client expects.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResponse {
    /// The value itself, unwrapped.
    Raw(Value),
    /// `{success: 1, errormsg: "", info: "", result: null, data}`.
    Data(Value),
    /// `{node}` for create and update.
    Node(BrowserNode),
    /// `{success: 1, info, data}`.
    Info { info: String, data: Value },
}

impl NodeResponse {
    pub fn data(value: impl Into<Value>) -> Self {
        NodeResponse::Data(value.into())
    }

    pub fn text(sql: impl Into<String>) -> Self {
        NodeResponse::Raw(Value::String(sql.into()))
    }

    pub fn info(info: impl Into<String>, data: Value) -> Self {
        NodeResponse::Info {
            info: info.into(),
            data,
        }
    }
}
