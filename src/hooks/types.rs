//! Hook traits
//!
//! - `RunHooks` - observe every agent of a run (set on `RunConfig`)
//! - `AgentHooks` - observe one agent (set on `Agent`)
//!
//! Every method has a no-op default, so implementors only override what they
//! need. A hook error ends the run.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::agent::Agent;
use crate::core::RunContext;
use crate::items::{InputItem, ModelResponse};
use crate::tools::Tool;

/// Lifecycle callbacks for a whole run
#[async_trait]
pub trait RunHooks: Send + Sync {
    /// Before the model is called
    async fn on_llm_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _system_prompt: Option<&str>,
        _input: &[InputItem],
    ) -> Result<()> {
        Ok(())
    }

    /// After the model answered
    async fn on_llm_end(&self, _ctx: &RunContext, _agent: &Agent, _response: &ModelResponse) -> Result<()> {
        Ok(())
    }

    /// Whenever a new agent becomes active, including the starting agent
    async fn on_agent_start(&self, _ctx: &RunContext, _agent: &Agent) -> Result<()> {
        Ok(())
    }

    /// When an agent produced the final output
    async fn on_agent_end(&self, _ctx: &RunContext, _agent: &Agent, _output: &Value) -> Result<()> {
        Ok(())
    }

    async fn on_handoff(&self, _ctx: &RunContext, _from: &Agent, _to: &Agent) -> Result<()> {
        Ok(())
    }

    async fn on_tool_start(&self, _ctx: &RunContext, _agent: &Agent, _tool: &dyn Tool) -> Result<()> {
        Ok(())
    }

    async fn on_tool_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
        _result: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle callbacks for a single agent
#[async_trait]
pub trait AgentHooks: Send + Sync {
    /// When this agent becomes active
    async fn on_start(&self, _ctx: &RunContext, _agent: &Agent) -> Result<()> {
        Ok(())
    }

    /// When this agent produced the final output
    async fn on_end(&self, _ctx: &RunContext, _agent: &Agent, _output: &Value) -> Result<()> {
        Ok(())
    }

    /// When control is handed to this agent; `source` is the previous agent
    async fn on_handoff(&self, _ctx: &RunContext, _agent: &Agent, _source: &Agent) -> Result<()> {
        Ok(())
    }

    async fn on_tool_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
        _arguments: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_tool_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool: &dyn Tool,
        _result: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_llm_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _system_prompt: Option<&str>,
        _input: &[InputItem],
    ) -> Result<()> {
        Ok(())
    }

    async fn on_llm_end(&self, _ctx: &RunContext, _agent: &Agent, _response: &ModelResponse) -> Result<()> {
        Ok(())
    }
}
