//! Tool backend available to the agent
//!
//! Tools are stateless singletons; the registry is built once at process
//! start and shared by every run.

mod calculator;
mod clock;
mod think;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;
pub use think::ThinkTool;

use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: Value,
}

impl ToolOutput {
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::String(message.into()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Failed(String),
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    async fn run(&self, input: Value) -> ToolOutput;
}

/// The tool-execution collaborator the agent graph talks to
#[async_trait]
pub trait ToolBackend: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDefinition>;

    async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError>;
}

#[async_trait]
impl<T: ToolBackend + ?Sized> ToolBackend for Arc<T> {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        (**self).list_tools()
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        (**self).invoke(name, args).await
    }
}

/// Collection of tools available to conversations
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create the standard tool registry
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(CalculatorTool),
            Arc::new(ClockTool),
            Arc::new(ThinkTool),
        ])
    }

    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ToolBackend for ToolRegistry {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let result = tool.run(args).await;
        tracing::debug!(tool = %name, success = result.success, "Tool finished");
        if result.success {
            Ok(result.output)
        } else {
            Err(ToolError::Failed(match result.output {
                Value::String(message) => message,
                other => other.to_string(),
            }))
        }
    }
}
