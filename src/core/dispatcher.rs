/// Tool Dispatcher
///
/// Resolves a tool by name, validates the call's arguments against the tool's
/// advertised input schema, runs the handler and normalizes every outcome into
/// a `ToolResult`. Only two outcomes leave the dispatcher as errors: an unknown
/// tool name and a sandbox access denial.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::core::error::{ACCESS_DENIED_MESSAGE, DispatchError, ToolError};
use crate::core::registry::{Arguments, ToolDescriptor, ToolRegistry};

/// Outcome of a single tool invocation.
///
/// Serializes either as the handler's own JSON object or as
/// `{ "error": "<message>" }`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success(Value),
    Failure(String),
}

impl ToolResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Success(value) => value,
            Self::Failure(message) => serde_json::json!({ "error": message }),
        }
    }
}

impl Serialize for ToolResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Success(value) => value.serialize(serializer),
            Self::Failure(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", message)?;
                map.end()
            }
        }
    }
}

/// Routes tool calls to their registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invoke tool `name` with `args`.
    ///
    /// Missing or mistyped arguments, handler failures and handler panics all
    /// come back as `ToolResult::Failure`; the handler is not invoked when the
    /// name is unknown or the arguments are rejected.
    pub async fn call(&self, name: &str, args: Arguments) -> Result<ToolResult, DispatchError> {
        let (Some(tool), Some(handler)) = (self.registry.descriptor(name), self.registry.lookup(name))
        else {
            tracing::warn!(tool = name, "unknown tool requested");
            return Err(DispatchError::UnknownTool(name.to_string()));
        };

        if let Err(err) = validate_arguments(tool, &args) {
            tracing::debug!(tool = name, error = %err, "rejected tool arguments");
            return Ok(ToolResult::Failure(err.to_string()));
        }

        tracing::debug!(tool = name, "dispatching tool call");
        match AssertUnwindSafe(handler.call(args)).catch_unwind().await {
            Ok(Ok(value)) => Ok(ToolResult::Success(value)),
            Ok(Err(ToolError::AccessDenied)) => {
                tracing::warn!(tool = name, "sandbox denied tool call");
                Err(DispatchError::AccessDenied(ACCESS_DENIED_MESSAGE.to_string()))
            }
            Ok(Err(err)) => Ok(ToolResult::Failure(err.to_string())),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(tool = name, %reason, "tool handler panicked");
                Ok(ToolResult::Failure(format!(
                    "Tool '{name}' failed unexpectedly: {reason}"
                )))
            }
        }
    }
}

/// Check `args` against the descriptor's `required` list and property types.
///
/// A required argument is missing when absent, `null`, or a string shorter than
/// the property's `minLength`. Optional arguments are only type-checked when
/// present and non-null.
pub fn validate_arguments(tool: &ToolDescriptor, args: &Arguments) -> Result<(), ToolError> {
    for name in tool.required() {
        let min_length = tool
            .property(name)
            .and_then(|schema| schema.get("minLength"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        match args.get(name) {
            None | Some(Value::Null) => return Err(ToolError::MissingParameter(name.to_string())),
            Some(Value::String(s)) if (s.chars().count() as u64) < min_length => {
                return Err(ToolError::MissingParameter(name.to_string()));
            }
            Some(_) => {}
        }
    }

    for (name, schema) in tool.properties() {
        let Some(value) = args.get(name).filter(|v| !v.is_null()) else {
            continue;
        };
        let Some(expected) = schema.get("type").and_then(Value::as_str) else {
            continue;
        };
        if !matches_type(expected, value) {
            return Err(ToolError::InvalidParameter {
                name: name.clone(),
                expected: expected.to_string(),
            });
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        // Model-generated calls often quote ids; handlers accept numeric strings too.
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_str().is_some_and(|s| s.trim().parse::<i64>().is_ok())
        }
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
