//! Events delivered to a streaming consumer

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::agent::Agent;
use crate::items::RunItem;
use crate::llm::ResponseEvent;

/// Semantic name of a run item event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunItemEventName {
    MessageOutputCreated,
    HandoffRequested,
    HandoffOccured,
    ToolCalled,
    ToolOutput,
    ReasoningItemCreated,
    McpApprovalRequested,
    McpApprovalResponse,
    McpListTools,
}

impl RunItemEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunItemEventName::MessageOutputCreated => "message_output_created",
            RunItemEventName::HandoffRequested => "handoff_requested",
            // Wire name keeps the historical spelling
            RunItemEventName::HandoffOccured => "handoff_occured",
            RunItemEventName::ToolCalled => "tool_called",
            RunItemEventName::ToolOutput => "tool_output",
            RunItemEventName::ReasoningItemCreated => "reasoning_item_created",
            RunItemEventName::McpApprovalRequested => "mcp_approval_requested",
            RunItemEventName::McpApprovalResponse => "mcp_approval_response",
            RunItemEventName::McpListTools => "mcp_list_tools",
        }
    }

    /// Event name a run item is announced under
    pub fn for_item(item: &RunItem) -> Self {
        match item {
            RunItem::MessageOutput { .. } => RunItemEventName::MessageOutputCreated,
            RunItem::HandoffCall { .. } => RunItemEventName::HandoffRequested,
            RunItem::HandoffOutput { .. } => RunItemEventName::HandoffOccured,
            RunItem::ToolCall { .. } => RunItemEventName::ToolCalled,
            RunItem::ToolCallOutput { .. } => RunItemEventName::ToolOutput,
            RunItem::Reasoning { .. } => RunItemEventName::ReasoningItemCreated,
            RunItem::McpApprovalRequest { .. } => RunItemEventName::McpApprovalRequested,
            RunItem::McpApprovalResponse { .. } => RunItemEventName::McpApprovalResponse,
            RunItem::McpListTools { .. } => RunItemEventName::McpListTools,
        }
    }
}

impl fmt::Display for RunItemEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of a streamed run
#[derive(Clone)]
pub enum StreamEvent {
    /// Provider-level event passed through unchanged
    RawResponse(ResponseEvent),

    /// The active agent changed
    AgentUpdated { new_agent: Arc<Agent> },

    /// A run item was produced
    RunItem { name: RunItemEventName, item: RunItem },
}

impl StreamEvent {
    pub fn for_item(item: RunItem) -> Self {
        StreamEvent::RunItem {
            name: RunItemEventName::for_item(&item),
            item,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::RawResponse(_) => "raw_response_event",
            StreamEvent::AgentUpdated { .. } => "agent_updated_stream_event",
            StreamEvent::RunItem { .. } => "run_item_stream_event",
        }
    }

    /// JSON form sent to callback publishers
    pub fn to_json(&self) -> Value {
        match self {
            StreamEvent::RawResponse(event) => json!({
                "type": self.event_type(),
                "data": event,
            }),
            StreamEvent::AgentUpdated { new_agent } => json!({
                "type": self.event_type(),
                "new_agent": new_agent.name,
            }),
            StreamEvent::RunItem { name, item } => json!({
                "type": self.event_type(),
                "name": name.as_str(),
                "item": item,
            }),
        }
    }
}

impl fmt::Debug for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::RawResponse(event) => f.debug_tuple("RawResponse").field(&event.event_type()).finish(),
            StreamEvent::AgentUpdated { new_agent } => f
                .debug_struct("AgentUpdated")
                .field("new_agent", &new_agent.name)
                .finish(),
            StreamEvent::RunItem { name, item } => f
                .debug_struct("RunItem")
                .field("name", name)
                .field("item", item)
                .finish(),
        }
    }
}

/// What travels through the event queue
#[derive(Debug, Clone)]
pub(crate) enum QueueEvent {
    Event(StreamEvent),
    /// The producer will push nothing more
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{FunctionToolCall, Message};

    #[test]
    fn test_item_event_names() {
        let message = RunItem::MessageOutput {
            agent: "a".into(),
            raw_item: Message::assistant("m1", "hi"),
        };
        let handoff = RunItem::HandoffCall {
            agent: "a".into(),
            raw_item: FunctionToolCall::new("c1", "transfer_to_b", "{}"),
        };

        assert_eq!(RunItemEventName::for_item(&message).as_str(), "message_output_created");
        assert_eq!(RunItemEventName::for_item(&handoff).as_str(), "handoff_requested");
        assert_eq!(RunItemEventName::HandoffOccured.to_string(), "handoff_occured");
    }

    #[test]
    fn test_event_json() {
        let event = StreamEvent::for_item(RunItem::MessageOutput {
            agent: "writer".into(),
            raw_item: Message::assistant("m1", "done"),
        });
        let value = event.to_json();
        assert_eq!(value["type"], "run_item_stream_event");
        assert_eq!(value["name"], "message_output_created");
        assert_eq!(value["item"]["agent"], "writer");

        let updated = StreamEvent::AgentUpdated {
            new_agent: Arc::new(Agent::new("billing")),
        };
        assert_eq!(updated.to_json()["new_agent"], "billing");
    }
}
