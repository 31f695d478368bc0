use thiserror::Error;

/// Failures raised while serving a browser node request.
///
/// Every variant maps onto one of the JSON envelopes the tree client
/// understands (see `api::response`).
#[derive(Debug, Error)]
pub enum NodeError {
    /// The database rejected a statement. The message is the driver text.
    #[error("{0}")]
    Driver(String),

    /// The requested object no longer exists (HTTP 410).
    #[error("{0}")]
    Gone(String),

    /// A mandatory form field is absent (HTTP 410).
    #[error("Could not find the required parameter ({0}).")]
    MissingParameter(String),

    /// Delete target vanished between listing and dropping.
    #[error("Error: Object not found.")]
    ObjectNotFound { info: String },

    /// Server state does not allow the operation (HTTP 428).
    #[error("{0}")]
    PreconditionRequired(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("template error: {0}")]
    Template(String),

    /// The (node, action, method) triple is not routed.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl NodeError {
    pub fn gone(message: impl Into<String>) -> Self {
        NodeError::Gone(message.into())
    }

    pub fn missing(arg: &str) -> Self {
        NodeError::MissingParameter(arg.to_string())
    }
}

impl From<minijinja::Error> for NodeError {
    fn from(err: minijinja::Error) -> Self {
        NodeError::Template(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::BadRequest(err.to_string())
    }
}

impl From<sqlx::Error> for NodeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => NodeError::Driver(db.message().to_string()),
            other => NodeError::Driver(other.to_string()),
        }
    }
}

pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_message() {
        let err = NodeError::missing("tmpllexize");
        assert_eq!(
            err.to_string(),
            "Could not find the required parameter (tmpllexize)."
        );
    }

    #[test]
    fn test_object_not_found_message() {
        let err = NodeError::ObjectNotFound {
            info: "The specified sequence could not be found.\n".to_string(),
        };
        assert_eq!(err.to_string(), "Error: Object not found.");
    }
}
