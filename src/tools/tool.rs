//! Tool trait definition
//!
//! All tools implement this trait to provide a consistent interface. Local
//! tools (function, computer, local shell) are invoked by the runner; hosted
//! tools are only described to the model, which runs them itself.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::hosted::HostedMcpTool;
use crate::core::RunContext;
use crate::llm::{ModelProvider, ToolDefinition};

/// Which family a tool belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Function,
    Computer,
    LocalShell,
    WebSearch,
    FileSearch,
    CodeInterpreter,
    ImageGeneration,
    HostedMcp,
}

impl ToolKind {
    /// Manifest type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Function => "function",
            ToolKind::Computer => "computer",
            ToolKind::LocalShell => "local_shell",
            ToolKind::WebSearch => "web_search",
            ToolKind::FileSearch => "file_search",
            ToolKind::CodeInterpreter => "code_interpreter",
            ToolKind::ImageGeneration => "image_generation",
            ToolKind::HostedMcp => "hosted_mcp",
        }
    }

    /// Whether the runner executes this tool itself
    pub fn is_local(&self) -> bool {
        matches!(self, ToolKind::Function | ToolKind::Computer | ToolKind::LocalShell)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output of the tool
    pub output: Value,
    /// Whether the tool reported a failure the model should see
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::String(message.into()),
            is_error: true,
        }
    }

    /// Output as sent back to the model; strings are not re-quoted
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl From<Value> for ToolResult {
    fn from(output: Value) -> Self {
        ToolResult::success(output)
    }
}

impl From<String> for ToolResult {
    fn from(output: String) -> Self {
        ToolResult::success(output)
    }
}

impl From<&str> for ToolResult {
    fn from(output: &str) -> Self {
        ToolResult::success(output)
    }
}

/// Everything a tool invocation can see
#[derive(Clone)]
pub struct ToolContext {
    pub run: RunContext,
    pub model_provider: Arc<dyn ModelProvider>,
    /// Agent that issued the call
    pub agent_name: String,
    pub call_id: String,
    /// Cancelled when the run is torn down
    pub cancel: CancellationToken,
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("agent_name", &self.agent_name)
            .field("call_id", &self.call_id)
            .finish()
    }
}

/// Trait for tools an agent can use
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> ToolKind;

    /// Definition sent to the model
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool.
    ///
    /// `arguments` is the raw argument string of the call: JSON arguments for
    /// function tools, the serialized action for computer and shell tools.
    /// Return `Ok(ToolResult::error(..))` for failures the model should see;
    /// an `Err` ends the run.
    async fn invoke(&self, ctx: &ToolContext, arguments: &str) -> Result<ToolResult>;

    /// Hosted MCP view of this tool, used to answer approval requests
    fn as_hosted_mcp(&self) -> Option<&HostedMcpTool> {
        None
    }
}

impl fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
