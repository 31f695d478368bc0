use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

use crate::error::NodeError;
use crate::model::NodeResponse;

/// Envelope wrapper around a verb outcome, so handlers can return
/// `ApiResult` directly.
pub struct ApiResponse(pub NodeResponse);

pub type ApiResult = Result<ApiResponse, ApiError>;

/// `{success: 1, errormsg: "", info: "", result: null, data}`.
pub fn data_envelope(data: Value) -> Value {
    json!({
        "success": 1,
        "errormsg": "",
        "info": "",
        "result": null,
        "data": data,
    })
}

impl From<NodeResponse> for ApiResponse {
    fn from(response: NodeResponse) -> Self {
        ApiResponse(response)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let body = match self.0 {
            NodeResponse::Raw(value) => value,
            NodeResponse::Data(data) => data_envelope(data),
            NodeResponse::Node(node) => json!({ "node": node }),
            NodeResponse::Info { info, data } => json!({
                "success": 1,
                "info": info,
                "data": data,
            }),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

pub struct ApiError(pub NodeError);

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NodeError::Driver(_) | NodeError::Template(_) | NodeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            NodeError::Gone(_) | NodeError::MissingParameter(_) => StatusCode::GONE,
            NodeError::ObjectNotFound { .. } => StatusCode::OK,
            NodeError::PreconditionRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            NodeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            NodeError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            log::error!("{}", message);
        } else {
            log::debug!("{} {}", status, message);
        }

        let body = match &self.0 {
            NodeError::ObjectNotFound { info } => json!({
                "success": 0,
                "errormsg": message,
                "info": info,
            }),
            _ => json!({
                "success": 0,
                "errormsg": message,
                "info": "",
                "result": null,
                "data": null,
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BrowserNode;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (NodeError::Driver("syntax error".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (NodeError::gone("Could not find the collation object."), StatusCode::GONE),
            (NodeError::missing("name"), StatusCode::GONE),
            (NodeError::ObjectNotFound { info: "gone".into() }, StatusCode::OK),
            (
                NodeError::PreconditionRequired("Not connected".into()),
                StatusCode::PRECONDITION_REQUIRED,
            ),
            (NodeError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (NodeError::NotFound("no route".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_node_envelope_status() {
        let node = BrowserNode::new("schema", 2200, 13799, "public", "icon-schema", false);
        let response = ApiResponse(NodeResponse::Node(node)).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_data_envelope() {
        assert_eq!(
            data_envelope(json!([1])),
            json!({"success": 1, "errormsg": "", "info": "", "result": null, "data": [1]})
        );
    }
}
