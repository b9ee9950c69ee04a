//! Request, tool definition and streaming event types exchanged with models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::settings::ModelSettings;
use crate::items::{InputItem, ModelResponse, OutputItem};

// ============================================================================
// Tool definitions
// ============================================================================

/// Tool description sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function {
        name: String,
        description: String,
        parameters: Value,
        #[serde(default)]
        strict: bool,
    },
    Computer {
        environment: String,
        display_width: u32,
        display_height: u32,
    },
    LocalShell,
    WebSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_location: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_context_size: Option<String>,
    },
    FileSearch {
        vector_store_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_num_results: Option<u64>,
        #[serde(default)]
        include_search_results: bool,
    },
    CodeInterpreter {
        container: Value,
    },
    ImageGeneration {
        #[serde(default)]
        config: Value,
    },
    Mcp {
        server_label: String,
        server_url: String,
        require_approval: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allowed_tools: Option<Vec<String>>,
    },
}

impl ToolDefinition {
    /// Function tool definition with a JSON schema for its arguments
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition::Function {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: false,
        }
    }

    /// Name the model uses to call this tool
    pub fn name(&self) -> &str {
        match self {
            ToolDefinition::Function { name, .. } => name,
            ToolDefinition::Computer { .. } => "computer_use_preview",
            ToolDefinition::LocalShell => "local_shell",
            ToolDefinition::WebSearch { .. } => "web_search",
            ToolDefinition::FileSearch { .. } => "file_search",
            ToolDefinition::CodeInterpreter { .. } => "code_interpreter",
            ToolDefinition::ImageGeneration { .. } => "image_generation",
            ToolDefinition::Mcp { server_label, .. } => server_label,
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// Everything a model needs for one call
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system_instructions: Option<String>,
    pub input: Vec<InputItem>,
    pub settings: ModelSettings,
    /// Tools and handoffs, handoffs rendered as function tools
    pub tools: Vec<ToolDefinition>,
    /// JSON schema the final message must follow, if any
    pub output_schema: Option<Value>,
    pub previous_response_id: Option<String>,
    pub prompt_id: Option<String>,
}

impl ModelRequest {
    /// Text of the most recent user message in the input
    pub fn last_user_text(&self) -> Option<String> {
        self.input.iter().rev().find_map(|item| match item {
            InputItem::Message(m) if m.role == crate::items::Role::User => Some(m.text()),
            _ => None,
        })
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }
}

// ============================================================================
// Streaming events
// ============================================================================

/// Raw provider-level event of a streamed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseEvent {
    #[serde(rename = "response.created")]
    Created { response_id: String },

    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { output_index: usize, delta: String },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone { output_index: usize, item: OutputItem },

    #[serde(rename = "response.completed")]
    Completed { response: ModelResponse },
}

impl ResponseEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ResponseEvent::Created { .. } => "response.created",
            ResponseEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponseEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponseEvent::Completed { .. } => "response.completed",
        }
    }
}
