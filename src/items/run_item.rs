//! Run items - semantic units produced while a run executes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::input::{InputItem, Message};
use super::output::{
    ComputerCallOutput, ComputerToolCall, FunctionCallOutput, FunctionToolCall, HostedToolCall,
    LocalShellCall, LocalShellCallOutput, McpApprovalRequest, McpApprovalResponse, McpCall,
    McpListTools, ReasoningItem,
};

/// Raw payload of a tool call, one variant per call kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallKind {
    FunctionCall(FunctionToolCall),
    ComputerCall(ComputerToolCall),
    LocalShellCall(LocalShellCall),
    FileSearchCall(HostedToolCall),
    WebSearchCall(HostedToolCall),
    CodeInterpreterCall(HostedToolCall),
    ImageGenerationCall(HostedToolCall),
    McpCall(McpCall),
}

impl ToolCallKind {
    pub fn to_input_item(&self) -> InputItem {
        match self.clone() {
            ToolCallKind::FunctionCall(c) => InputItem::FunctionCall(c),
            ToolCallKind::ComputerCall(c) => InputItem::ComputerCall(c),
            ToolCallKind::LocalShellCall(c) => InputItem::LocalShellCall(c),
            ToolCallKind::FileSearchCall(c) => InputItem::FileSearchCall(c),
            ToolCallKind::WebSearchCall(c) => InputItem::WebSearchCall(c),
            ToolCallKind::CodeInterpreterCall(c) => InputItem::CodeInterpreterCall(c),
            ToolCallKind::ImageGenerationCall(c) => InputItem::ImageGenerationCall(c),
            ToolCallKind::McpCall(c) => InputItem::McpCall(c),
        }
    }

    /// Short label used in summaries and console output
    pub fn label(&self) -> &'static str {
        match self {
            ToolCallKind::FunctionCall(_) => "function",
            ToolCallKind::ComputerCall(_) => "computer",
            ToolCallKind::LocalShellCall(_) => "local_shell",
            ToolCallKind::FileSearchCall(_) => "file_search",
            ToolCallKind::WebSearchCall(_) => "web_search",
            ToolCallKind::CodeInterpreterCall(_) => "code_interpreter",
            ToolCallKind::ImageGenerationCall(_) => "image_generation",
            ToolCallKind::McpCall(_) => "mcp",
        }
    }
}

/// Raw payload of a locally executed tool's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutputKind {
    FunctionCallOutput(FunctionCallOutput),
    ComputerCallOutput(ComputerCallOutput),
    LocalShellCallOutput(LocalShellCallOutput),
}

impl ToolOutputKind {
    pub fn to_input_item(&self) -> InputItem {
        match self.clone() {
            ToolOutputKind::FunctionCallOutput(o) => InputItem::FunctionCallOutput(o),
            ToolOutputKind::ComputerCallOutput(o) => InputItem::ComputerCallOutput(o),
            ToolOutputKind::LocalShellCallOutput(o) => InputItem::LocalShellCallOutput(o),
        }
    }
}

/// A unit of model- or tool-produced output, tagged with the producing agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunItem {
    #[serde(rename = "message_output_item")]
    MessageOutput { agent: String, raw_item: Message },

    #[serde(rename = "handoff_call_item")]
    HandoffCall {
        agent: String,
        raw_item: FunctionToolCall,
    },

    #[serde(rename = "handoff_output_item")]
    HandoffOutput {
        agent: String,
        raw_item: InputItem,
        source_agent: String,
        target_agent: String,
    },

    #[serde(rename = "tool_call_item")]
    ToolCall { agent: String, raw_item: ToolCallKind },

    #[serde(rename = "tool_call_output_item")]
    ToolCallOutput {
        agent: String,
        raw_item: ToolOutputKind,
        /// Output as returned by the tool, before string conversion
        output: Value,
    },

    #[serde(rename = "reasoning_item")]
    Reasoning {
        agent: String,
        raw_item: ReasoningItem,
    },

    #[serde(rename = "mcp_list_tools_item")]
    McpListTools { agent: String, raw_item: McpListTools },

    #[serde(rename = "mcp_approval_request_item")]
    McpApprovalRequest {
        agent: String,
        raw_item: McpApprovalRequest,
    },

    #[serde(rename = "mcp_approval_response_item")]
    McpApprovalResponse {
        agent: String,
        raw_item: McpApprovalResponse,
    },
}

impl RunItem {
    /// Name of the agent that produced this item
    pub fn agent(&self) -> &str {
        match self {
            RunItem::MessageOutput { agent, .. }
            | RunItem::HandoffCall { agent, .. }
            | RunItem::HandoffOutput { agent, .. }
            | RunItem::ToolCall { agent, .. }
            | RunItem::ToolCallOutput { agent, .. }
            | RunItem::Reasoning { agent, .. }
            | RunItem::McpListTools { agent, .. }
            | RunItem::McpApprovalRequest { agent, .. }
            | RunItem::McpApprovalResponse { agent, .. } => agent,
        }
    }

    /// Serialized `type` name of this item
    pub fn item_type(&self) -> &'static str {
        match self {
            RunItem::MessageOutput { .. } => "message_output_item",
            RunItem::HandoffCall { .. } => "handoff_call_item",
            RunItem::HandoffOutput { .. } => "handoff_output_item",
            RunItem::ToolCall { .. } => "tool_call_item",
            RunItem::ToolCallOutput { .. } => "tool_call_output_item",
            RunItem::Reasoning { .. } => "reasoning_item",
            RunItem::McpListTools { .. } => "mcp_list_tools_item",
            RunItem::McpApprovalRequest { .. } => "mcp_approval_request_item",
            RunItem::McpApprovalResponse { .. } => "mcp_approval_response_item",
        }
    }

    /// Normalized input form of this item
    pub fn to_input_item(&self) -> InputItem {
        match self {
            RunItem::MessageOutput { raw_item, .. } => InputItem::Message(raw_item.clone()),
            RunItem::HandoffCall { raw_item, .. } => InputItem::FunctionCall(raw_item.clone()),
            RunItem::HandoffOutput { raw_item, .. } => raw_item.clone(),
            RunItem::ToolCall { raw_item, .. } => raw_item.to_input_item(),
            RunItem::ToolCallOutput { raw_item, .. } => raw_item.to_input_item(),
            RunItem::Reasoning { raw_item, .. } => InputItem::Reasoning(raw_item.clone()),
            RunItem::McpListTools { raw_item, .. } => InputItem::McpListTools(raw_item.clone()),
            RunItem::McpApprovalRequest { raw_item, .. } => {
                InputItem::McpApprovalRequest(raw_item.clone())
            }
            RunItem::McpApprovalResponse { raw_item, .. } => {
                InputItem::McpApprovalResponse(raw_item.clone())
            }
        }
    }

    pub fn is_tool_related(&self) -> bool {
        matches!(
            self,
            RunItem::HandoffCall { .. }
                | RunItem::HandoffOutput { .. }
                | RunItem::ToolCall { .. }
                | RunItem::ToolCallOutput { .. }
        )
    }
}

/// Text of a message output item, empty for any other item
pub fn text_message_output(item: &RunItem) -> String {
    match item {
        RunItem::MessageOutput { raw_item, .. } => raw_item.text(),
        _ => String::new(),
    }
}

/// Concatenated text of every message output item
pub fn text_message_outputs(items: &[RunItem]) -> String {
    items.iter().map(text_message_output).collect()
}

/// Merge an original input with the normalized form of every new item
pub fn to_input_list(input: &[InputItem], new_items: &[RunItem]) -> Vec<InputItem> {
    let mut list = Vec::with_capacity(input.len() + new_items.len());
    list.extend_from_slice(input);
    list.extend(new_items.iter().map(RunItem::to_input_item));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_items() -> Vec<RunItem> {
        vec![
            RunItem::ToolCall {
                agent: "triage".into(),
                raw_item: ToolCallKind::FunctionCall(FunctionToolCall::new("c1", "lookup", "{}")),
            },
            RunItem::ToolCallOutput {
                agent: "triage".into(),
                raw_item: ToolOutputKind::FunctionCallOutput(FunctionCallOutput {
                    call_id: "c1".into(),
                    output: "42".into(),
                }),
                output: json!(42),
            },
            RunItem::MessageOutput {
                agent: "triage".into(),
                raw_item: Message::assistant("m1", "The answer is 42"),
            },
        ]
    }

    #[test]
    fn test_to_input_list_appends_in_order() {
        let input = vec![InputItem::user("question")];
        let items = sample_items();
        let list = to_input_list(&input, &items);

        assert_eq!(list.len(), 4);
        assert_eq!(list[0], InputItem::user("question"));
        assert!(matches!(list[1], InputItem::FunctionCall(_)));
        assert!(matches!(list[2], InputItem::FunctionCallOutput(_)));
        assert!(matches!(list[3], InputItem::Message(_)));

        // Pure function of its arguments
        assert_eq!(list, to_input_list(&input, &items));
    }

    #[test]
    fn test_item_type_matches_serialized_tag() {
        for item in sample_items() {
            let value = serde_json::to_value(&item).unwrap();
            assert_eq!(value["type"], item.item_type());
            assert_eq!(item.agent(), "triage");
        }
    }

    #[test]
    fn test_text_message_outputs() {
        let items = sample_items();
        assert_eq!(text_message_outputs(&items), "The answer is 42");
        assert_eq!(text_message_output(&items[0]), "");
    }

    #[test]
    fn test_handoff_output_passes_raw_item_through() {
        let raw = InputItem::FunctionCallOutput(FunctionCallOutput {
            call_id: "h1".into(),
            output: "{\"assistant\": \"billing\"}".into(),
        });
        let item = RunItem::HandoffOutput {
            agent: "triage".into(),
            raw_item: raw.clone(),
            source_agent: "triage".into(),
            target_agent: "billing".into(),
        };
        assert_eq!(item.to_input_item(), raw);
        assert!(item.is_tool_related());
    }
}
