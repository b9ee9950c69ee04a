//! Items emitted by a model and the tool payloads they carry

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::input::Message;

/// A call to a locally executed function tool (also used for handoffs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

impl FunctionToolCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutput {
    pub call_id: String,
    pub output: String,
}

/// A computer-use action requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputerToolCall {
    pub id: String,
    pub call_id: String,
    pub action: Value,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputerCallOutput {
    pub call_id: String,
    /// `{"type": "computer_screenshot", "image_url": ...}`
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalShellAction {
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalShellCall {
    pub id: String,
    pub call_id: String,
    pub action: LocalShellAction,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalShellCallOutput {
    /// Call id of the shell call this answers
    pub id: String,
    pub output: String,
}

/// Call to a tool the model provider runs itself (web search, file search,
/// code interpreter, image generation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedToolCall {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpCall {
    pub id: String,
    pub server_label: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    pub id: String,
    #[serde(default)]
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpListTools {
    pub id: String,
    pub server_label: String,
    #[serde(default)]
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpApprovalRequest {
    pub id: String,
    pub server_label: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpApprovalResponse {
    pub approval_request_id: String,
    pub approve: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One item of a model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message(Message),
    FunctionCall(FunctionToolCall),
    ComputerCall(ComputerToolCall),
    LocalShellCall(LocalShellCall),
    FileSearchCall(HostedToolCall),
    WebSearchCall(HostedToolCall),
    CodeInterpreterCall(HostedToolCall),
    ImageGenerationCall(HostedToolCall),
    McpCall(McpCall),
    Reasoning(ReasoningItem),
    McpListTools(McpListTools),
    McpApprovalRequest(McpApprovalRequest),
}

impl OutputItem {
    /// Wire `type` tag of this item
    pub fn type_name(&self) -> &'static str {
        match self {
            OutputItem::Message(_) => "message",
            OutputItem::FunctionCall(_) => "function_call",
            OutputItem::ComputerCall(_) => "computer_call",
            OutputItem::LocalShellCall(_) => "local_shell_call",
            OutputItem::FileSearchCall(_) => "file_search_call",
            OutputItem::WebSearchCall(_) => "web_search_call",
            OutputItem::CodeInterpreterCall(_) => "code_interpreter_call",
            OutputItem::ImageGenerationCall(_) => "image_generation_call",
            OutputItem::McpCall(_) => "mcp_call",
            OutputItem::Reasoning(_) => "reasoning",
            OutputItem::McpListTools(_) => "mcp_list_tools",
            OutputItem::McpApprovalRequest(_) => "mcp_approval_request",
        }
    }
}
