//! Tool registry: named callable capabilities with optional input schemas.
//!
//! The registry owns tool *definitions* only. It never invokes a handler;
//! dispatch belongs to the invocation gateway. Registration happens during a
//! single-threaded startup phase, before the server accepts requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A failure raised by a tool handler.
///
/// Handlers own their failure modes; the gateway wraps this into a
/// `ToolExecutionError` without interpreting it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        ToolError {
            message: message.into(),
        }
    }
}

/// The uniform invocation interface behind every registered tool.
///
/// Object-safe so the registry can hold heterogeneous handlers; closures adapt
/// into it via [`ToolDefinition::from_fn`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value, ToolError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, input: Value) -> Result<Value, ToolError> {
        (self.0)(input).await
    }
}

/// Errors raised at registration or lookup time.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A tool with this name is already registered. Names are process-wide keys.
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),
    /// No tool with this name is registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// The definition's input schema is not a valid JSON Schema.
    #[error("invalid input schema for tool {tool}: {reason}")]
    InvalidSchema { tool: String, reason: String },
}

/// A registered tool: immutable metadata plus the handler behind it.
pub struct ToolDefinition {
    name: String,
    description: String,
    handler: Arc<dyn ToolHandler>,
    input_schema: Option<Value>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            handler,
            input_schema: None,
        }
    }

    /// Declares a tool callback-style from an async closure.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::new(name, description, Arc::new(FnHandler(handler)))
    }

    /// Attaches a JSON Schema constraint for the tool's input payload.
    ///
    /// The schema is compiled at registration time; an uncompilable schema
    /// fails [`ToolRegistry::register`].
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }
}

/// Public metadata for one tool, as exposed by `list()` and the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// A registered tool together with its compiled input validator.
pub(crate) struct RegisteredTool {
    pub(crate) definition: ToolDefinition,
    pub(crate) validator: Option<jsonschema::Validator>,
}

/// Ordered, name-keyed store of tool definitions.
///
/// Lookup is by name; `list()` preserves registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<RegisteredTool>>,
    by_name: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool definition.
    ///
    /// The entry becomes visible to `list()` and `get()` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateToolName`] if the name is taken, or
    /// [`RegistryError::InvalidSchema`] if the input schema does not compile.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), RegistryError> {
        if self.by_name.contains_key(definition.name()) {
            return Err(RegistryError::DuplicateToolName(
                definition.name().to_string(),
            ));
        }
        let validator = match definition.input_schema() {
            Some(schema) => Some(jsonschema::validator_for(schema).map_err(|e| {
                RegistryError::InvalidSchema {
                    tool: definition.name().to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        let name = definition.name().to_string();
        self.tools.push(Arc::new(RegisteredTool {
            definition,
            validator,
        }));
        self.by_name.insert(name, self.tools.len() - 1);
        Ok(())
    }

    /// Returns public metadata for all tools in registration order.
    pub fn list(&self) -> Vec<ToolMetadata> {
        self.tools
            .iter()
            .map(|tool| ToolMetadata {
                name: tool.definition.name().to_string(),
                description: tool.definition.description().to_string(),
                input_schema: tool.definition.input_schema().cloned(),
            })
            .collect()
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ToolNotFound`] for an unknown name.
    pub(crate) fn get(&self, name: &str) -> Result<&Arc<RegisteredTool>, RegistryError> {
        self.by_name
            .get(name)
            .map(|&index| &self.tools[index])
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))
    }

    /// Looks up a tool's definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ToolNotFound`] for an unknown name.
    pub fn get_definition(&self, name: &str) -> Result<&ToolDefinition, RegistryError> {
        self.get(name).map(|tool| &tool.definition)
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

    fn echo_tool(name: &str) -> ToolDefinition {
        ToolDefinition::from_fn(name, format!("{name} tool"), |input| async move {
            Ok(input)
        })
    }

    #[test]
    fn test_register_then_get_and_list() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("translate")).unwrap();
        registry.register(echo_tool("detect_language")).unwrap();

        let definition = registry.get_definition("translate").unwrap();
        assert_eq!(definition.name(), "translate");
        assert_eq!(definition.description(), "translate tool");

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "translate");
        assert_eq!(listed[1].name, "detect_language");

        // Listed exactly once.
        let count = listed.iter().filter(|m| m.name == "translate").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("translate")).unwrap();
        let err = registry.register(echo_tool("translate")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateToolName(name) if name == "translate"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.get_definition("missing").unwrap_err();
        assert!(matches!(err, RegistryError::ToolNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_invalid_schema_rejected_at_registration() {
        let mut registry = ToolRegistry::new();
        let definition = echo_tool("translate")
            .with_input_schema(json!({"type": "no-such-type"}));
        let err = registry.register(definition).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema { tool, .. } if tool == "translate"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handler_reachable_through_definition() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("echo")).unwrap();
        let tool = registry.get("echo").unwrap();
        let output = tool
            .definition
            .handler()
            .call(json!({"hello": "world"}))
            .await
            .unwrap();
        assert_eq!(output, json!({"hello": "world"}));
    }
}
