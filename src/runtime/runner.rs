//! Runner entry points
//!
//! `Runner::run_streamed` starts a run in the background and returns the
//! streaming handle at once. `Runner::run` drains that handle and freezes
//! the outcome into a `RunResult`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::Instrument;

use super::result::RunResult;
use super::streaming::{CompletionGuard, RunResultStreaming, StreamingState};
use super::task::BackgroundTask;
use super::turn::RunImpl;
use crate::agent::{Agent, HandoffInputFilter};
use crate::core::{AgentsResult, RunContext, TaskKind};
use crate::hooks::RunHooks;
use crate::items::Input;
use crate::llm::{EchoModel, ModelProvider, ModelSettings, StaticModelProvider};
use crate::session::Session;

pub const DEFAULT_MAX_TURNS: u64 = 10;
pub const DEFAULT_WORKFLOW_NAME: &str = "Agent workflow";

/// Settings for one run
#[derive(Clone)]
pub struct RunConfig {
    pub model_provider: Arc<dyn ModelProvider>,
    /// Model name used for every agent, overriding their own
    pub model: Option<String>,
    /// Settings layered over each agent's own
    pub model_settings: Option<ModelSettings>,
    pub max_turns: u64,
    pub hooks: Option<Arc<dyn RunHooks>>,
    pub session: Option<Arc<dyn Session>>,
    /// Number of session items prepended to the input, all when `None`
    pub history_limit: Option<usize>,
    pub workflow_name: String,
    pub group_id: Option<String>,
    pub trace_id: Option<String>,
    pub trace_metadata: HashMap<String, String>,
    /// Applied to handoffs that carry no filter of their own
    pub handoff_input_filter: Option<HandoffInputFilter>,
    pub context: RunContext,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_provider: Arc::new(StaticModelProvider::new(Arc::new(EchoModel::new()))),
            model: None,
            model_settings: None,
            max_turns: DEFAULT_MAX_TURNS,
            hooks: None,
            session: None,
            history_limit: None,
            workflow_name: DEFAULT_WORKFLOW_NAME.to_string(),
            group_id: None,
            trace_id: None,
            trace_metadata: HashMap::new(),
            handoff_input_filter: None,
            context: RunContext::default(),
        }
    }
}

impl RunConfig {
    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = provider;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = Some(settings);
        self
    }

    pub fn with_max_turns(mut self, max_turns: u64) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = name.into();
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_trace_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.trace_metadata = metadata;
        self
    }

    pub fn with_handoff_input_filter(mut self, filter: HandoffInputFilter) -> Self {
        self.handoff_input_filter = Some(filter);
        self
    }

    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("workflow_name", &self.workflow_name)
            .field("group_id", &self.group_id)
            .field("has_session", &self.session.is_some())
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

/// Starts runs of an agent graph
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Start a run and return its streaming handle immediately
    pub fn run_streamed(&self, agent: Arc<Agent>, input: impl Into<Input>) -> RunResultStreaming {
        let run_input = input.into().to_items();
        let state = Arc::new(StreamingState::new(
            run_input.clone(),
            agent.clone(),
            self.config.max_turns,
            self.config.context.clone(),
        ));
        let handle = RunResultStreaming::new(state.clone());

        let span = tracing::info_span!(
            "run",
            workflow = %self.config.workflow_name,
            agent = %agent.name,
            group_id = self.config.group_id.as_deref().unwrap_or_default(),
        );
        tracing::info!(
            workflow = %self.config.workflow_name,
            agent = %agent.name,
            max_turns = self.config.max_turns,
            "[Runner] Starting streamed run"
        );

        // Captured by the future so it drops even when the task is cancelled before its first poll
        let complete = CompletionGuard(state.clone());
        let run = RunImpl::new(state.clone(), self.config.clone(), run_input);
        let fut = async move {
            let _complete = complete;
            run.run(agent).await
        };
        let task = BackgroundTask::spawn(TaskKind::RunImpl, &state.cancel, fut.instrument(span));
        state.set_run_impl_task(task);
        handle
    }

    /// Run to completion
    pub async fn run(&self, agent: Arc<Agent>, input: impl Into<Input>) -> AgentsResult<RunResult> {
        let streaming = self.run_streamed(agent, input);
        streaming.stream_events(|_| async { Ok(()) }).await?;
        Ok(streaming.to_result())
    }
}
