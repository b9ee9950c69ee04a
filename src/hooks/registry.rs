//! Hook composition
//!
//! Contains:
//! - `CombinedRunHooks` / `CombinedAgentHooks` - fan out to several hooks in
//!   order, stopping at the first error
//! - `ToolScopedHooks` - forwards tool callbacks only for matching tool names

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::types::{AgentHooks, RunHooks};
use crate::agent::Agent;
use crate::core::RunContext;
use crate::items::{InputItem, ModelResponse};
use crate::tools::Tool;

/// Several run hooks called in registration order
#[derive(Clone, Default)]
pub struct CombinedRunHooks {
    hooks: Vec<Arc<dyn RunHooks>>,
}

impl CombinedRunHooks {
    pub fn new(hooks: Vec<Arc<dyn RunHooks>>) -> Self {
        Self { hooks }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl RunHooks for CombinedRunHooks {
    async fn on_llm_start(
        &self,
        ctx: &RunContext,
        agent: &Agent,
        system_prompt: Option<&str>,
        input: &[InputItem],
    ) -> Result<()> {
        for hook in &self.hooks {
            hook.on_llm_start(ctx, agent, system_prompt, input).await?;
        }
        Ok(())
    }

    async fn on_llm_end(&self, ctx: &RunContext, agent: &Agent, response: &ModelResponse) -> Result<()> {
        for hook in &self.hooks {
            hook.on_llm_end(ctx, agent, response).await?;
        }
        Ok(())
    }

    async fn on_agent_start(&self, ctx: &RunContext, agent: &Agent) -> Result<()> {
        for hook in &self.hooks {
            hook.on_agent_start(ctx, agent).await?;
        }
        Ok(())
    }

    async fn on_agent_end(&self, ctx: &RunContext, agent: &Agent, output: &Value) -> Result<()> {
        for hook in &self.hooks {
            hook.on_agent_end(ctx, agent, output).await?;
        }
        Ok(())
    }

    async fn on_handoff(&self, ctx: &RunContext, from: &Agent, to: &Agent) -> Result<()> {
        for hook in &self.hooks {
            hook.on_handoff(ctx, from, to).await?;
        }
        Ok(())
    }

    async fn on_tool_start(&self, ctx: &RunContext, agent: &Agent, tool: &dyn Tool) -> Result<()> {
        for hook in &self.hooks {
            hook.on_tool_start(ctx, agent, tool).await?;
        }
        Ok(())
    }

    async fn on_tool_end(&self, ctx: &RunContext, agent: &Agent, tool: &dyn Tool, result: &str) -> Result<()> {
        for hook in &self.hooks {
            hook.on_tool_end(ctx, agent, tool, result).await?;
        }
        Ok(())
    }
}

/// Several agent hooks called in registration order
#[derive(Clone, Default)]
pub struct CombinedAgentHooks {
    hooks: Vec<Arc<dyn AgentHooks>>,
}

impl CombinedAgentHooks {
    pub fn new(hooks: Vec<Arc<dyn AgentHooks>>) -> Self {
        Self { hooks }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl AgentHooks for CombinedAgentHooks {
    async fn on_start(&self, ctx: &RunContext, agent: &Agent) -> Result<()> {
        for hook in &self.hooks {
            hook.on_start(ctx, agent).await?;
        }
        Ok(())
    }

    async fn on_end(&self, ctx: &RunContext, agent: &Agent, output: &Value) -> Result<()> {
        for hook in &self.hooks {
            hook.on_end(ctx, agent, output).await?;
        }
        Ok(())
    }

    async fn on_handoff(&self, ctx: &RunContext, agent: &Agent, source: &Agent) -> Result<()> {
        for hook in &self.hooks {
            hook.on_handoff(ctx, agent, source).await?;
        }
        Ok(())
    }

    async fn on_tool_start(&self, ctx: &RunContext, agent: &Agent, tool: &dyn Tool, arguments: &str) -> Result<()> {
        for hook in &self.hooks {
            hook.on_tool_start(ctx, agent, tool, arguments).await?;
        }
        Ok(())
    }

    async fn on_tool_end(&self, ctx: &RunContext, agent: &Agent, tool: &dyn Tool, result: &str) -> Result<()> {
        for hook in &self.hooks {
            hook.on_tool_end(ctx, agent, tool, result).await?;
        }
        Ok(())
    }

    async fn on_llm_start(
        &self,
        ctx: &RunContext,
        agent: &Agent,
        system_prompt: Option<&str>,
        input: &[InputItem],
    ) -> Result<()> {
        for hook in &self.hooks {
            hook.on_llm_start(ctx, agent, system_prompt, input).await?;
        }
        Ok(())
    }

    async fn on_llm_end(&self, ctx: &RunContext, agent: &Agent, response: &ModelResponse) -> Result<()> {
        for hook in &self.hooks {
            hook.on_llm_end(ctx, agent, response).await?;
        }
        Ok(())
    }
}

/// Agent hooks whose tool callbacks only fire for matching tool names
///
/// Pattern examples:
/// - `"get_weather"` - one tool
/// - `"^transfer_to_"` - every handoff-style tool
/// - `"lookup|search"` - several tools
///
/// Non-tool callbacks are forwarded unless the hooks are `tools_only`.
pub struct ToolScopedHooks {
    pattern: Option<Regex>,
    inner: Arc<dyn AgentHooks>,
    tools_only: bool,
}

impl ToolScopedHooks {
    /// Match every tool
    pub fn all(inner: Arc<dyn AgentHooks>) -> Self {
        Self {
            pattern: None,
            inner,
            tools_only: false,
        }
    }

    pub fn with_pattern(pattern: &str, inner: Arc<dyn AgentHooks>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Some(Regex::new(pattern)?),
            inner,
            tools_only: false,
        })
    }

    /// Hooks attached to a single tool by exact name
    pub fn for_tool(tool_name: &str, inner: Arc<dyn AgentHooks>) -> Self {
        let pattern = format!("^{}$", regex::escape(tool_name));
        Self {
            pattern: Regex::new(&pattern).ok(),
            inner,
            tools_only: true,
        }
    }

    /// Drop agent lifecycle and model callbacks
    pub fn tools_only(mut self) -> Self {
        self.tools_only = true;
        self
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        match &self.pattern {
            Some(regex) => regex.is_match(tool_name),
            None => true,
        }
    }
}

impl std::fmt::Debug for ToolScopedHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolScopedHooks")
            .field("pattern", &self.pattern.as_ref().map(|r| r.as_str()))
            .finish()
    }
}

#[async_trait]
impl AgentHooks for ToolScopedHooks {
    async fn on_start(&self, ctx: &RunContext, agent: &Agent) -> Result<()> {
        if self.tools_only {
            return Ok(());
        }
        self.inner.on_start(ctx, agent).await
    }

    async fn on_end(&self, ctx: &RunContext, agent: &Agent, output: &Value) -> Result<()> {
        if self.tools_only {
            return Ok(());
        }
        self.inner.on_end(ctx, agent, output).await
    }

    async fn on_handoff(&self, ctx: &RunContext, agent: &Agent, source: &Agent) -> Result<()> {
        if self.tools_only {
            return Ok(());
        }
        self.inner.on_handoff(ctx, agent, source).await
    }

    async fn on_tool_start(&self, ctx: &RunContext, agent: &Agent, tool: &dyn Tool, arguments: &str) -> Result<()> {
        if !self.matches(tool.name()) {
            return Ok(());
        }
        self.inner.on_tool_start(ctx, agent, tool, arguments).await
    }

    async fn on_tool_end(&self, ctx: &RunContext, agent: &Agent, tool: &dyn Tool, result: &str) -> Result<()> {
        if !self.matches(tool.name()) {
            return Ok(());
        }
        self.inner.on_tool_end(ctx, agent, tool, result).await
    }

    async fn on_llm_start(
        &self,
        ctx: &RunContext,
        agent: &Agent,
        system_prompt: Option<&str>,
        input: &[InputItem],
    ) -> Result<()> {
        if self.tools_only {
            return Ok(());
        }
        self.inner.on_llm_start(ctx, agent, system_prompt, input).await
    }

    async fn on_llm_end(&self, ctx: &RunContext, agent: &Agent, response: &ModelResponse) -> Result<()> {
        if self.tools_only {
            return Ok(());
        }
        self.inner.on_llm_end(ctx, agent, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        fail_on_start: bool,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RunHooks for Recorder {
        async fn on_agent_start(&self, _ctx: &RunContext, agent: &Agent) -> Result<()> {
            self.events.lock().unwrap().push(format!("start:{}", agent.name));
            if self.fail_on_start {
                anyhow::bail!("hook refused");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AgentHooks for Recorder {
        async fn on_tool_start(&self, _ctx: &RunContext, _agent: &Agent, tool: &dyn Tool, _arguments: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("tool:{}", tool.name()));
            Ok(())
        }
    }

    fn echo_tool(name: &str) -> FunctionTool {
        FunctionTool::new(name, "test tool", serde_json::json!({"type": "object"}), |_ctx, args| async move {
            Ok(args)
        })
    }

    #[tokio::test]
    async fn test_combined_run_hooks_stop_at_first_error() {
        let first = Arc::new(Recorder {
            fail_on_start: true,
            ..Default::default()
        });
        let second = Arc::new(Recorder::default());
        let combined = CombinedRunHooks::new(vec![first.clone(), second.clone()]);

        let agent = Agent::new("triage");
        let err = combined
            .on_agent_start(&RunContext::default(), &agent)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "hook refused");
        assert_eq!(first.events(), vec!["start:triage"]);
        assert!(second.events().is_empty());
    }

    #[tokio::test]
    async fn test_tool_scoped_hooks_filter_by_name() {
        let recorder = Arc::new(Recorder::default());
        let scoped = ToolScopedHooks::with_pattern("^get_", recorder.clone()).unwrap();
        let agent = Agent::new("triage");
        let ctx = RunContext::default();

        scoped
            .on_tool_start(&ctx, &agent, &echo_tool("get_weather"), "{}")
            .await
            .unwrap();
        scoped
            .on_tool_start(&ctx, &agent, &echo_tool("send_email"), "{}")
            .await
            .unwrap();

        assert_eq!(recorder.events(), vec!["tool:get_weather"]);
    }

    #[test]
    fn test_scoped_matcher_without_pattern() {
        let scoped = ToolScopedHooks::all(Arc::new(Recorder::default()));
        assert!(scoped.matches("anything"));
    }
}
