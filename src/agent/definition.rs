//! Agent definition
//!
//! An `Agent` is plain configuration: instructions, model choice, tools,
//! handoffs, guardrails and output type. The runner drives it.
//!
//! ```ignore
//! let agent = Agent::new("assistant")
//!     .with_instructions("You are a helpful assistant")
//!     .with_tool(Arc::new(weather_tool))
//!     .with_output_guardrail(no_secrets)
//!     .with_tool_use_behavior(ToolUseBehavior::StopOnFirstTool);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::handoff::Handoff;
use super::output_type::OutputType;
use super::tool_use::ToolUseBehavior;
use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::hooks::AgentHooks;
use crate::llm::{Model, ModelSettings, ToolDefinition};
use crate::tools::{AgentTool, AgentToolOptions, Tool};

/// Which model an agent uses
#[derive(Clone)]
pub enum AgentModel {
    /// Resolved through the run's model provider
    Name(String),
    /// Used as is
    Instance(Arc<dyn Model>),
}

impl fmt::Debug for AgentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentModel::Name(name) => f.debug_tuple("Name").field(name).finish(),
            AgentModel::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// Configuration of one agent
#[derive(Clone)]
pub struct Agent {
    pub name: String,

    /// Shown to other agents when this agent is a handoff target
    pub handoff_description: Option<String>,

    /// System prompt
    pub instructions: Option<String>,

    /// Stored prompt reference forwarded to the model
    pub prompt_id: Option<String>,

    /// `None` uses the provider's default model
    pub model: Option<AgentModel>,

    pub model_settings: ModelSettings,

    pub tools: Vec<Arc<dyn Tool>>,

    pub handoffs: Vec<Handoff>,

    pub input_guardrails: Vec<InputGuardrail>,

    pub output_guardrails: Vec<OutputGuardrail>,

    /// `None` means plain text output
    pub output_type: Option<Arc<dyn OutputType>>,

    pub tool_use_behavior: ToolUseBehavior,

    pub hooks: Option<Arc<dyn AgentHooks>>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handoff_description: None,
            instructions: None,
            prompt_id: None,
            model: None,
            model_settings: ModelSettings::default(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            output_type: None,
            tool_use_behavior: ToolUseBehavior::default(),
            hooks: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn with_prompt_id(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = Some(prompt_id.into());
        self
    }

    /// Use a model by name
    pub fn with_model(mut self, name: impl Into<String>) -> Self {
        self.model = Some(AgentModel::Name(name.into()));
        self
    }

    /// Use a specific model instance
    pub fn with_model_instance(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(AgentModel::Instance(model));
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    /// Hand off directly to another agent with default settings
    pub fn with_agent_handoff(self, agent: Arc<Agent>) -> Self {
        self.with_handoff(Handoff::to_agent(agent))
    }

    pub fn with_input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: OutputGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    pub fn with_output_type(mut self, output_type: Arc<dyn OutputType>) -> Self {
        self.output_type = Some(output_type);
        self
    }

    pub fn with_tool_use_behavior(mut self, behavior: ToolUseBehavior) -> Self {
        self.tool_use_behavior = behavior;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Expose this agent as a tool other agents can call
    pub fn as_tool(self: &Arc<Self>, options: AgentToolOptions) -> AgentTool {
        AgentTool::new(self.clone(), options)
    }

    /// Whether the final output is free text
    pub fn is_plain_text(&self) -> bool {
        self.output_type.as_ref().map_or(true, |t| t.is_plain_text())
    }

    /// JSON schema of the final output, if structured
    pub fn output_schema(&self) -> Option<Value> {
        self.output_type
            .as_ref()
            .filter(|t| !t.is_plain_text())
            .map(|t| t.json_schema())
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn find_handoff(&self, tool_name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.tool_name == tool_name)
    }

    /// Tool and handoff definitions sent to the model
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| t.definition())
            .chain(self.handoffs.iter().map(Handoff::definition))
            .collect()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field(
                "handoffs",
                &self.handoffs.iter().map(|h| h.agent_name.as_str()).collect::<Vec<_>>(),
            )
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_guardrails", &self.output_guardrails.len())
            .field("output_type", &self.output_type.as_ref().map(|t| t.name().to_string()))
            .field("tool_use_behavior", &self.tool_use_behavior)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::JsonObjectOutputType;
    use crate::tools::FunctionTool;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let tool = FunctionTool::new("lookup", "Look things up", json!({"type": "object"}), |_ctx, args| async move {
            Ok(args)
        });
        let billing = Arc::new(Agent::new("Billing Agent").with_handoff_description("Handles invoices"));

        let agent = Agent::new("triage")
            .with_instructions("Route the request")
            .with_model("gpt-4.1")
            .with_tool(Arc::new(tool))
            .with_agent_handoff(billing);

        assert_eq!(agent.instructions.as_deref(), Some("Route the request"));
        assert!(matches!(agent.model, Some(AgentModel::Name(ref n)) if n == "gpt-4.1"));
        assert!(agent.find_tool("lookup").is_some());
        assert!(agent.find_handoff("transfer_to_billing_agent").is_some());

        let names: Vec<String> = agent
            .tool_definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["lookup", "transfer_to_billing_agent"]);
    }

    #[test]
    fn test_output_schema() {
        let plain = Agent::new("writer");
        assert!(plain.is_plain_text());
        assert!(plain.output_schema().is_none());

        let structured = Agent::new("extractor").with_output_type(Arc::new(JsonObjectOutputType));
        assert!(!structured.is_plain_text());
        assert_eq!(structured.output_schema(), Some(json!({"type": "object"})));
    }
}
