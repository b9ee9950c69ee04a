//! Handoffs between agents
//!
//! A handoff is presented to the model as a function tool named
//! `transfer_to_<agent>`. Calling it makes the target agent active for the
//! next turn. Targets can be bound directly or looked up lazily in an
//! `AgentDirectory`, which lets a builder wire cyclic agent graphs.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::json;

use super::definition::Agent;
use crate::core::{AgentsError, AgentsResult};
use crate::items::{InputItem, RunItem};
use crate::llm::ToolDefinition;

/// Agents published by name once a graph is fully built
#[derive(Clone, Default)]
pub struct AgentDirectory(Arc<OnceLock<HashMap<String, Arc<Agent>>>>);

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the final agents; only the first call has an effect
    pub fn publish(&self, agents: HashMap<String, Arc<Agent>>) -> bool {
        self.0.set(agents).is_ok()
    }

    pub fn is_published(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.0.get().and_then(|agents| agents.get(name).cloned())
    }
}

impl fmt::Debug for AgentDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Option<Vec<&String>> = self.0.get().map(|agents| agents.keys().collect());
        f.debug_tuple("AgentDirectory").field(&names).finish()
    }
}

#[derive(Clone)]
enum HandoffTarget {
    Direct(Arc<Agent>),
    Deferred(AgentDirectory),
}

/// Conversation state handed to the next agent
#[derive(Debug, Clone, Default)]
pub struct HandoffInputData {
    /// Input of the run before the current turn
    pub input_history: Vec<InputItem>,
    /// Items generated before the turn that triggered the handoff
    pub pre_handoff_items: Vec<RunItem>,
    /// Items of the current turn, including the handoff call and output
    pub new_items: Vec<RunItem>,
}

/// Rewrites the conversation before the next agent sees it
pub type HandoffInputFilter = Arc<dyn Fn(HandoffInputData) -> HandoffInputData + Send + Sync>;

/// Drop every tool call and tool output from the handed-off conversation
pub fn remove_all_tools(data: HandoffInputData) -> HandoffInputData {
    HandoffInputData {
        input_history: data
            .input_history
            .into_iter()
            .filter(|item| !item.is_tool_related())
            .collect(),
        pre_handoff_items: data
            .pre_handoff_items
            .into_iter()
            .filter(|item| !item.is_tool_related())
            .collect(),
        new_items: data
            .new_items
            .into_iter()
            .filter(|item| !item.is_tool_related())
            .collect(),
    }
}

/// Lower-case a name and replace anything that is not alphanumeric with `_`
pub fn snake_case(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Default tool name for handing off to `agent_name`
pub fn default_tool_name(agent_name: &str) -> String {
    format!("transfer_to_{}", snake_case(agent_name))
}

/// Default tool description for handing off to `agent_name`
pub fn default_tool_description(agent_name: &str, handoff_description: Option<&str>) -> String {
    let mut description = format!("Handoff to the {} agent to handle the request.", agent_name);
    if let Some(extra) = handoff_description.filter(|d| !d.trim().is_empty()) {
        description.push(' ');
        description.push_str(extra);
    }
    description
}

/// A transfer of control to another agent
#[derive(Clone)]
pub struct Handoff {
    pub tool_name: String,
    pub tool_description: String,
    /// Name of the target agent
    pub agent_name: String,
    pub input_filter: Option<HandoffInputFilter>,
    target: HandoffTarget,
}

impl Handoff {
    /// Hand off to an already built agent
    pub fn to_agent(agent: Arc<Agent>) -> Self {
        Self {
            tool_name: default_tool_name(&agent.name),
            tool_description: default_tool_description(&agent.name, agent.handoff_description.as_deref()),
            agent_name: agent.name.clone(),
            input_filter: None,
            target: HandoffTarget::Direct(agent),
        }
    }

    /// Hand off to an agent that will be published in `directory` later
    pub fn deferred(
        directory: AgentDirectory,
        agent_name: impl Into<String>,
        handoff_description: Option<&str>,
    ) -> Self {
        let agent_name = agent_name.into();
        Self {
            tool_name: default_tool_name(&agent_name),
            tool_description: default_tool_description(&agent_name, handoff_description),
            agent_name,
            input_filter: None,
            target: HandoffTarget::Deferred(directory),
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    pub fn with_tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = description.into();
        self
    }

    pub fn with_input_filter(mut self, filter: HandoffInputFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    /// The agent to activate
    pub fn resolve(&self) -> AgentsResult<Arc<Agent>> {
        match &self.target {
            HandoffTarget::Direct(agent) => Ok(agent.clone()),
            HandoffTarget::Deferred(directory) => directory.get(&self.agent_name).ok_or_else(|| {
                AgentsError::user(format!("handoff target {:?} is not available", self.agent_name))
            }),
        }
    }

    /// Function tool shown to the model; it takes no arguments
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.tool_name.clone(),
            self.tool_description.clone(),
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        )
    }

    /// Tool output recorded once the handoff happened
    pub fn transfer_message(&self) -> String {
        json!({ "assistant": self.agent_name }).to_string()
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("tool_name", &self.tool_name)
            .field("agent_name", &self.agent_name)
            .field("has_input_filter", &self.input_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{FunctionCallOutput, FunctionToolCall, Message, ToolCallKind, ToolOutputKind};

    #[test]
    fn test_default_names() {
        assert_eq!(default_tool_name("Billing Agent"), "transfer_to_billing_agent");
        assert_eq!(default_tool_name("faq-bot"), "transfer_to_faq_bot");
        assert_eq!(
            default_tool_description("billing", Some("Handles invoices")),
            "Handoff to the billing agent to handle the request. Handles invoices"
        );
    }

    #[test]
    fn test_deferred_handoff_resolves_after_publish() {
        let directory = AgentDirectory::new();
        let handoff = Handoff::deferred(directory.clone(), "billing", None);
        assert!(handoff.resolve().is_err());

        let billing = Arc::new(Agent::new("billing"));
        assert!(directory.publish(HashMap::from([("billing".to_string(), billing.clone())])));
        assert!(!directory.publish(HashMap::new()));

        assert!(Arc::ptr_eq(&handoff.resolve().unwrap(), &billing));
    }

    #[test]
    fn test_cyclic_graph() {
        let directory = AgentDirectory::new();
        let a = Arc::new(Agent::new("a").with_handoff(Handoff::deferred(directory.clone(), "b", None)));
        let b = Arc::new(Agent::new("b").with_handoff(Handoff::deferred(directory.clone(), "a", None)));
        directory.publish(HashMap::from([("a".to_string(), a.clone()), ("b".to_string(), b)]));

        let next = a.handoffs[0].resolve().unwrap();
        let back = next.handoffs[0].resolve().unwrap();
        assert_eq!(back.name, "a");
    }

    #[test]
    fn test_remove_all_tools() {
        let data = HandoffInputData {
            input_history: vec![
                InputItem::user("hi"),
                InputItem::FunctionCall(FunctionToolCall::new("c0", "lookup", "{}")),
            ],
            pre_handoff_items: vec![RunItem::ToolCall {
                agent: "triage".into(),
                raw_item: ToolCallKind::FunctionCall(FunctionToolCall::new("c1", "lookup", "{}")),
            }],
            new_items: vec![
                RunItem::MessageOutput {
                    agent: "triage".into(),
                    raw_item: Message::assistant("m1", "transferring"),
                },
                RunItem::ToolCallOutput {
                    agent: "triage".into(),
                    raw_item: ToolOutputKind::FunctionCallOutput(FunctionCallOutput {
                        call_id: "c1".into(),
                        output: "ok".into(),
                    }),
                    output: json!("ok"),
                },
            ],
        };

        let filtered = remove_all_tools(data);
        assert_eq!(filtered.input_history, vec![InputItem::user("hi")]);
        assert!(filtered.pre_handoff_items.is_empty());
        assert_eq!(filtered.new_items.len(), 1);
    }
}
