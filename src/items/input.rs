//! Normalized input items
//!
//! Every item the model produces, and every item a caller supplies, converts
//! to an [`InputItem`] so a run's output can be appended to its input and fed
//! back to the model on the next turn.

use serde::{Deserialize, Serialize};

use super::output::{
    ComputerCallOutput, ComputerToolCall, FunctionCallOutput, FunctionToolCall, HostedToolCall,
    LocalShellCall, LocalShellCallOutput, McpApprovalRequest, McpApprovalResponse, McpCall,
    McpListTools, OutputItem, ReasoningItem,
};

// ============================================================================
// Messages
// ============================================================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
    Developer,
}

/// Requested fidelity for an image part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

/// One part of a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    InputImage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        #[serde(default)]
        detail: ImageDetail,
    },
    InputFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
    },
    OutputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
}

impl ContentPart {
    pub fn input_text(text: impl Into<String>) -> Self {
        ContentPart::InputText { text: text.into() }
    }

    pub fn output_text(text: impl Into<String>) -> Self {
        ContentPart::OutputText { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::InputImage {
            image_url: Some(url.into()),
            file_id: None,
            detail: ImageDetail::Auto,
        }
    }

    /// Text carried by this part, if it is a text part
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentPart::InputText { text } | ContentPart::OutputText { text } => Some(text),
            _ => None,
        }
    }
}

/// Message body: either a bare string or a list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of every text part
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().filter_map(ContentPart::text).collect(),
        }
    }
}

/// A chat message in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: None,
            role,
            content,
            status: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    /// Assistant message as a model would emit it
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: Role::Assistant,
            content: MessageContent::Parts(vec![ContentPart::output_text(text)]),
            status: Some("completed".to_string()),
        }
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

// ============================================================================
// InputItem
// ============================================================================

/// Normalized item accepted as model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message(Message),
    FunctionCall(FunctionToolCall),
    FunctionCallOutput(FunctionCallOutput),
    ComputerCall(ComputerToolCall),
    ComputerCallOutput(ComputerCallOutput),
    LocalShellCall(LocalShellCall),
    LocalShellCallOutput(LocalShellCallOutput),
    FileSearchCall(HostedToolCall),
    WebSearchCall(HostedToolCall),
    CodeInterpreterCall(HostedToolCall),
    ImageGenerationCall(HostedToolCall),
    McpCall(McpCall),
    Reasoning(ReasoningItem),
    McpListTools(McpListTools),
    McpApprovalRequest(McpApprovalRequest),
    McpApprovalResponse(McpApprovalResponse),
}

impl InputItem {
    pub fn user(text: impl Into<String>) -> Self {
        InputItem::Message(Message::user(text))
    }

    /// The message inside this item, if it is one
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            InputItem::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Whether this item is a tool call or tool output rather than a message
    pub fn is_tool_related(&self) -> bool {
        !matches!(self, InputItem::Message(_) | InputItem::Reasoning(_))
    }
}

impl From<Message> for InputItem {
    fn from(message: Message) -> Self {
        InputItem::Message(message)
    }
}

impl From<OutputItem> for InputItem {
    fn from(item: OutputItem) -> Self {
        match item {
            OutputItem::Message(m) => InputItem::Message(m),
            OutputItem::FunctionCall(c) => InputItem::FunctionCall(c),
            OutputItem::ComputerCall(c) => InputItem::ComputerCall(c),
            OutputItem::LocalShellCall(c) => InputItem::LocalShellCall(c),
            OutputItem::FileSearchCall(c) => InputItem::FileSearchCall(c),
            OutputItem::WebSearchCall(c) => InputItem::WebSearchCall(c),
            OutputItem::CodeInterpreterCall(c) => InputItem::CodeInterpreterCall(c),
            OutputItem::ImageGenerationCall(c) => InputItem::ImageGenerationCall(c),
            OutputItem::McpCall(c) => InputItem::McpCall(c),
            OutputItem::Reasoning(r) => InputItem::Reasoning(r),
            OutputItem::McpListTools(l) => InputItem::McpListTools(l),
            OutputItem::McpApprovalRequest(r) => InputItem::McpApprovalRequest(r),
        }
    }
}

// ============================================================================
// Input - what a run starts from
// ============================================================================

/// Initial input of a run: a plain string or a list of items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Text(String),
    Items(Vec<InputItem>),
}

impl Input {
    /// Expand to items; a string becomes one user message
    pub fn to_items(&self) -> Vec<InputItem> {
        match self {
            Input::Text(text) => vec![InputItem::user(text.clone())],
            Input::Items(items) => items.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Input::Text(text) => text.is_empty(),
            Input::Items(items) => items.is_empty(),
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Input::Items(Vec::new())
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<Vec<InputItem>> for Input {
    fn from(items: Vec<InputItem>) -> Self {
        Input::Items(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let item = InputItem::user("hello");
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({"type": "message", "role": "user", "content": "hello"})
        );
    }

    #[test]
    fn test_parts_content_deserializes() {
        let value = json!({
            "type": "message",
            "role": "user",
            "content": [
                {"type": "input_image", "image_url": "https://example.com/a.png", "detail": "high"},
                {"type": "input_text", "text": "What is this?"}
            ]
        });
        let item: InputItem = serde_json::from_value(value).unwrap();
        let message = item.as_message().unwrap();
        match &message.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(
                    parts[0],
                    ContentPart::InputImage { detail: ImageDetail::High, .. }
                ));
            }
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(message.text(), "What is this?");
    }

    #[test]
    fn test_input_text_expands_to_user_message() {
        let input = Input::from("hi");
        let items = input.to_items();
        assert_eq!(items, vec![InputItem::user("hi")]);
        assert!(!input.is_empty());
        assert!(Input::default().is_empty());
    }

    #[test]
    fn test_assistant_message_text() {
        let message = Message::assistant("msg_1", "done");
        assert_eq!(message.text(), "done");
        assert_eq!(message.role, Role::Assistant);
    }
}
