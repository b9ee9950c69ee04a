//! Agents exposed as tools
//!
//! Calling an `AgentTool` runs the wrapped agent to completion in a nested
//! run that shares the caller's model provider and context. The nested
//! agent's new messages become the tool output.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::tool::{Tool, ToolContext, ToolKind, ToolResult};
use crate::agent::{snake_case, Agent};
use crate::items::text_message_outputs;
use crate::llm::ToolDefinition;
use crate::runtime::{RunConfig, RunResult, Runner};

/// Turns a nested run's result into the tool output
pub type OutputExtractor = Arc<dyn Fn(&RunResult) -> Result<String> + Send + Sync>;

/// How an agent is presented as a tool
#[derive(Clone, Default)]
pub struct AgentToolOptions {
    /// Defaults to the agent name in snake case
    pub tool_name: Option<String>,
    /// Defaults to the agent's handoff description
    pub tool_description: Option<String>,
    pub output_extractor: Option<OutputExtractor>,
}

impl AgentToolOptions {
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = Some(description.into());
        self
    }

    pub fn with_output_extractor(mut self, extractor: OutputExtractor) -> Self {
        self.output_extractor = Some(extractor);
        self
    }
}

#[derive(Debug, Deserialize)]
struct AgentToolArgs {
    input: String,
}

pub struct AgentTool {
    agent: Arc<Agent>,
    name: String,
    description: String,
    output_extractor: Option<OutputExtractor>,
}

impl AgentTool {
    pub fn new(agent: Arc<Agent>, options: AgentToolOptions) -> Self {
        let name = options
            .tool_name
            .unwrap_or_else(|| snake_case(&agent.name));
        let description = options
            .tool_description
            .or_else(|| agent.handoff_description.clone())
            .unwrap_or_default();
        Self {
            agent,
            name,
            description,
            output_extractor: options.output_extractor,
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("agent", &self.agent.name)
            .finish()
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Function
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::Function {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": {"input": {"type": "string"}},
                "required": ["input"],
                "additionalProperties": false
            }),
            strict: true,
        }
    }

    async fn invoke(&self, ctx: &ToolContext, arguments: &str) -> Result<ToolResult> {
        let args: AgentToolArgs = match serde_json::from_str(arguments) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Invalid JSON input for tool {}: {}",
                    self.name, e
                )))
            }
        };

        tracing::info!(
            tool = %self.name,
            agent = %self.agent.name,
            caller = %ctx.agent_name,
            "[AgentTool] Running nested agent"
        );
        let runner = Runner::new(
            RunConfig::default()
                .with_model_provider(ctx.model_provider.clone())
                .with_context(ctx.run.clone()),
        );

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => anyhow::bail!("agent tool {} cancelled", self.name),
            result = runner.run(self.agent.clone(), args.input) => result?,
        };

        let output = match &self.output_extractor {
            Some(extract) => extract(&result)?,
            None => text_message_outputs(&result.new_items),
        };
        Ok(ToolResult::success(output))
    }
}
