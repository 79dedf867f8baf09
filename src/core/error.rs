/// Error Types
///
/// Errors are layered the same way requests flow through the server:
/// - `SandboxError`: path confinement failures from the sandbox
/// - `ToolError`: anything a tool handler can fail with; its message is what
///   clients see inside an in-band `{ "error": ... }` result
/// - `DispatchError`: the two outcomes that escape the dispatcher and become
///   JSON-RPC error objects

use thiserror::Error;

use crate::db::DbError;

/// JSON-RPC error code for a line that is not a JSON object (STDIO only).
pub const PARSE_ERROR: i32 = -32700;
/// JSON-RPC error code for an unknown method or tool.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// JSON-RPC error code for handler-level failures, including sandbox denials.
pub const SERVER_ERROR: i32 = -32000;
/// JSON-RPC error code for a request object with malformed fields.
pub const INVALID_REQUEST: i32 = -32600;
/// JSON-RPC error code for malformed method parameters.
pub const INVALID_PARAMS: i32 = -32602;

/// Message used for every path that would leave the base directory.
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied (outside allowed folder).";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Access denied (outside allowed folder).")]
    AccessDenied,
    #[error("Base directory unavailable: {0}")]
    BaseUnavailable(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Missing '{0}' parameter")]
    MissingParameter(String),
    #[error("Invalid '{name}' parameter: expected {expected}")]
    InvalidParameter { name: String, expected: String },
    #[error("Access denied (outside allowed folder).")]
    AccessDenied,
    /// A domain failure whose message is already client-ready
    #[error("{0}")]
    Failed(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::AccessDenied => Self::AccessDenied,
            SandboxError::BaseUnavailable(e) => Self::Io(e),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    AccessDenied(String),
}

impl DispatchError {
    /// JSON-RPC error code this outcome is reported with.
    pub fn code(&self) -> i32 {
        match self {
            Self::UnknownTool(_) => METHOD_NOT_FOUND,
            Self::AccessDenied(_) => SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_denial_keeps_its_identity_through_tool_error() {
        let err: ToolError = SandboxError::AccessDenied.into();
        assert!(matches!(err, ToolError::AccessDenied));
        assert_eq!(err.to_string(), ACCESS_DENIED_MESSAGE);
    }

    #[test]
    fn dispatch_errors_map_to_json_rpc_codes() {
        assert_eq!(DispatchError::UnknownTool("x".into()).code(), -32601);
        assert_eq!(
            DispatchError::AccessDenied(ACCESS_DENIED_MESSAGE.into()).code(),
            -32000
        );
    }

    #[test]
    fn missing_parameter_message_shape() {
        assert_eq!(
            ToolError::MissingParameter("path".into()).to_string(),
            "Missing 'path' parameter"
        );
    }
}
