//! Compact JSON payloads for `run.event` callbacks

use serde_json::{json, Map, Value};

use crate::items::{text_message_output, RunItem, ToolCallKind};
use crate::runtime::StreamEvent;

/// Payload of the `run.event` callback for `event`
pub fn serialize_stream_event(event: &StreamEvent) -> Value {
    match event {
        StreamEvent::RawResponse(raw) => {
            let mut payload = json!({
                "event_kind": "raw",
                "type": raw.event_type(),
            });
            match serde_json::to_value(raw) {
                Ok(data) => payload["data"] = data,
                Err(e) => payload["marshal_error"] = Value::String(e.to_string()),
            }
            payload
        }
        StreamEvent::AgentUpdated { new_agent } => json!({
            "event_kind": "agent_updated",
            "agent_name": new_agent.name,
        }),
        StreamEvent::RunItem { name, item } => json!({
            "event_kind": "run_item",
            "name": name.as_str(),
            "item": summarize_run_item(item),
        }),
    }
}

/// Short description of a run item; full payloads stay out of callbacks
pub fn summarize_run_item(item: &RunItem) -> Value {
    let mut summary = Map::new();
    summary.insert("type".into(), json!(item.item_type()));
    match item {
        RunItem::MessageOutput { agent, .. } => {
            summary.insert("agent".into(), json!(agent));
            summary.insert("text".into(), json!(text_message_output(item)));
        }
        RunItem::ToolCall { agent, raw_item } => {
            summary.insert("agent".into(), json!(agent));
            summary.insert("tool_call".into(), json!(raw_item.label()));
            match raw_item {
                ToolCallKind::FunctionCall(call) => {
                    summary.insert("function_name".into(), json!(call.name));
                }
                ToolCallKind::WebSearchCall(call) => {
                    summary.insert("web_search_status".into(), json!(call.status));
                }
                ToolCallKind::FileSearchCall(call) => {
                    summary.insert("file_search_status".into(), json!(call.status));
                }
                _ => {}
            }
        }
        RunItem::ToolCallOutput { agent, output, .. } => {
            summary.insert("agent".into(), json!(agent));
            summary.insert("output".into(), output.clone());
        }
        RunItem::HandoffOutput {
            agent,
            source_agent,
            target_agent,
            ..
        } => {
            summary.insert("agent".into(), json!(agent));
            summary.insert("source_agent".into(), json!(source_agent));
            summary.insert("target_agent".into(), json!(target_agent));
        }
        _ => {}
    }
    Value::Object(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::items::{FunctionToolCall, HostedToolCall, InputItem, Message, MessageContent, Role};
    use crate::llm::ResponseEvent;
    use std::sync::Arc;

    #[test]
    fn test_raw_event() {
        let event = StreamEvent::RawResponse(ResponseEvent::OutputTextDelta {
            output_index: 0,
            delta: "Hel".into(),
        });
        let payload = serialize_stream_event(&event);
        assert_eq!(payload["event_kind"], json!("raw"));
        assert_eq!(payload["type"], json!("response.output_text.delta"));
        assert_eq!(payload["data"]["delta"], json!("Hel"));
    }

    #[test]
    fn test_agent_updated() {
        let event = StreamEvent::AgentUpdated {
            new_agent: Arc::new(Agent::new("triage")),
        };
        assert_eq!(
            serialize_stream_event(&event),
            json!({"event_kind": "agent_updated", "agent_name": "triage"})
        );
    }

    #[test]
    fn test_message_and_tool_summaries() {
        let message = RunItem::MessageOutput {
            agent: "writer".into(),
            raw_item: Message::new(Role::Assistant, MessageContent::Text("Hi".into())),
        };
        let payload = serialize_stream_event(&StreamEvent::for_item(message));
        assert_eq!(payload["name"], json!("message_output_created"));
        assert_eq!(
            payload["item"],
            json!({"type": "message_output_item", "agent": "writer", "text": "Hi"})
        );

        let call = RunItem::ToolCall {
            agent: "writer".into(),
            raw_item: ToolCallKind::FunctionCall(FunctionToolCall::new("c1", "get_weather", "{}")),
        };
        let item = summarize_run_item(&call);
        assert_eq!(item["tool_call"], json!("function"));
        assert_eq!(item["function_name"], json!("get_weather"));

        let search = RunItem::ToolCall {
            agent: "writer".into(),
            raw_item: ToolCallKind::WebSearchCall(HostedToolCall {
                id: "ws1".into(),
                status: "completed".into(),
                result: Value::Null,
            }),
        };
        assert_eq!(summarize_run_item(&search)["web_search_status"], json!("completed"));
    }

    #[test]
    fn test_handoff_output_summary() {
        let item = RunItem::HandoffOutput {
            agent: "triage".into(),
            raw_item: InputItem::from(Message::new(Role::Assistant, MessageContent::Text("ok".into()))),
            source_agent: "triage".into(),
            target_agent: "billing".into(),
        };
        let summary = summarize_run_item(&item);
        assert_eq!(summary["type"], json!("handoff_output_item"));
        assert_eq!(summary["source_agent"], json!("triage"));
        assert_eq!(summary["target_agent"], json!("billing"));
    }
}
