//! Item model shared by models, the runner and the service layer
//!
//! - `InputItem` / `Input` - what the model consumes
//! - `OutputItem` / `ModelResponse` - what the model produces
//! - `RunItem` - what a run records, with the producing agent attached

pub mod input;
pub mod output;
pub mod response;
pub mod run_item;

pub use input::{ContentPart, ImageDetail, Input, InputItem, Message, MessageContent, Role};
pub use output::{
    ComputerCallOutput, ComputerToolCall, FunctionCallOutput, FunctionToolCall, HostedToolCall,
    LocalShellAction, LocalShellCall, LocalShellCallOutput, McpApprovalRequest,
    McpApprovalResponse, McpCall, McpListTools, OutputItem, ReasoningItem,
};
pub use response::{last_response_id, ModelResponse, Usage};
pub use run_item::{
    text_message_output, text_message_outputs, to_input_list, RunItem, ToolCallKind,
    ToolOutputKind,
};
