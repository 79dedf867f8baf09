/// Tool Registry
///
/// Static mapping from tool name to its descriptor and handler. The registry is
/// built once at startup (see `tools::build_registry`), wrapped in an `Arc`
/// and never mutated afterwards, so concurrent requests read it without
/// locking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::error::ToolError;

/// Arguments of a single tool call.
pub type Arguments = serde_json::Map<String, Value>;

/// MCP tool definition structure.
///
/// Each tool has a unique name, a description, and a JSON schema describing
/// its input. This is what `tools/list` advertises.
#[derive(Serialize, Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique tool identifier (e.g., "read_file")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema for the tool's input: `type`, `properties`, `required`
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }

    /// Names listed under `required`, in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// Schema of a single declared property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.input_schema.get("properties")?.get(name)
    }

    /// Declared property names with their schemas.
    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
    }
}

/// Handler for executing a tool.
///
/// Handlers receive arguments that already passed the dispatcher's schema
/// gate, and return either a JSON object (success) or a `ToolError`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Arguments) -> Result<Value, ToolError>;
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
}

/// Registry of available MCP tools.
///
/// Descriptors keep registration order for `tools/list`; handlers are looked
/// up by name for `tools/call`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with the registry.
    ///
    /// Fails if a tool with the same name is already present.
    pub fn register(
        &mut self,
        tool: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateTool(tool.name));
        }
        self.handlers.insert(tool.name.clone(), handler);
        self.tools.push(tool);
        Ok(())
    }

    /// All descriptors, in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Constant(Value);

    #[async_trait]
    impl ToolHandler for Constant {
        async fn call(&self, _args: Arguments) -> Result<Value, ToolError> {
            Ok(self.0.clone())
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            "test tool",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "a path" },
                    "depth": { "type": "integer", "description": "a depth" }
                },
                "required": ["path"]
            }),
        )
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(descriptor("read_file"), Arc::new(Constant(json!({}))))
            .unwrap();
        let err = registry
            .register(descriptor("read_file"), Arc::new(Constant(json!({}))))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("read_file".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(descriptor(name), Arc::new(Constant(json!({}))))
                .unwrap();
        }
        let names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert!(registry.lookup("alpha").is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn descriptor_serializes_input_schema_in_camel_case() {
        let value = serde_json::to_value(descriptor("read_file")).unwrap();
        assert_eq!(value["name"], "read_file");
        assert_eq!(value["inputSchema"]["required"], json!(["path"]));
        assert!(value.get("input_schema").is_none());
    }

    #[test]
    fn schema_accessors() {
        let tool = descriptor("read_file");
        assert_eq!(tool.required().collect::<Vec<_>>(), ["path"]);
        assert_eq!(tool.property("depth").unwrap()["type"], "integer");
        assert_eq!(tool.properties().count(), 2);
    }
}
