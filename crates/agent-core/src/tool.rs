//! Tool System
//!
//! Tools are registered at runtime and invoked by the reasoning loop through
//! native function calling. The concrete tools (file access, shell, search)
//! live outside this crate; only the contract and the registry live here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool arguments as decoded from the model's call
pub type ToolArguments = Map<String, Value>;

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// JSON Schema object describing the arguments
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Names listed under the schema's `required` key
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Tool trait - implement to add new capabilities
///
/// `execute` returns the text handed back to the model. An `Err` is turned
/// into an `Error: ...` result by the loop; tools may also return text that
/// starts with `Error:` themselves to signal failure.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: &ToolArguments) -> Result<String>;

    /// Validate arguments before execution (optional)
    fn validate(&self, arguments: &ToolArguments) -> Result<()> {
        let schema = self.schema();

        for param in schema.required_parameters() {
            if !arguments.contains_key(param) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param
                )));
            }
        }

        Ok(())
    }
}

/// Registry for available tools
///
/// Schemas are listed in registration order so request bodies are stable.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(Arc::new(tool));
    }

    /// Register a shared tool. A later tool with the same name replaces the
    /// earlier one.
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Validate and execute a named tool
    pub async fn execute(&self, name: &str, arguments: &ToolArguments) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        // Validate first
        tool.validate(arguments)?;

        tool.execute(arguments).await
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.schema())
            .collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
