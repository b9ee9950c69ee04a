//! Run and workflow error types

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::agent::Agent;
use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use crate::items::{InputItem, ModelResponse, RunItem};

/// The background task of a streamed run that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    RunImpl,
    InputGuardrails,
    OutputGuardrails,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::RunImpl => "run-impl",
            TaskKind::InputGuardrails => "input guardrails",
            TaskKind::OutputGuardrails => "output guardrails",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// RunErrorDetails - diagnostic snapshot attached to run errors
// ============================================================================

/// Snapshot of a run at the moment it failed
#[derive(Clone, Default)]
pub struct RunErrorDetails {
    pub input: Vec<InputItem>,
    pub new_items: Vec<RunItem>,
    pub raw_responses: Vec<ModelResponse>,
    pub last_agent: Option<Arc<Agent>>,
    pub input_guardrail_results: Vec<InputGuardrailResult>,
    pub output_guardrail_results: Vec<OutputGuardrailResult>,
}

impl RunErrorDetails {
    pub fn last_agent_name(&self) -> Option<&str> {
        self.last_agent.as_deref().map(|agent| agent.name.as_str())
    }
}

impl fmt::Debug for RunErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunErrorDetails")
            .field("input", &self.input.len())
            .field("new_items", &self.new_items.len())
            .field("raw_responses", &self.raw_responses.len())
            .field("last_agent", &self.last_agent_name())
            .field("input_guardrail_results", &self.input_guardrail_results)
            .field("output_guardrail_results", &self.output_guardrail_results)
            .finish()
    }
}

/// Optional boxed snapshot carried by every run error that can hold one
pub type Details = Option<Box<RunErrorDetails>>;

// ============================================================================
// AgentsError - terminal error of a run
// ============================================================================

/// Errors that terminate an agent run
///
/// Foreign errors are kept behind `Arc` so the whole enum is `Clone`; the
/// streaming result hands the same stored error to every caller that asks.
#[derive(Error, Debug, Clone)]
pub enum AgentsError {
    /// The run went past its turn limit
    #[error("Max turns ({max_turns}) exceeded")]
    MaxTurnsExceeded { max_turns: u64, details: Details },

    /// An input guardrail reported a tripwire
    #[error("Input guardrail {} triggered tripwire", .result.guardrail_name)]
    InputGuardrailTripwireTriggered {
        result: Box<InputGuardrailResult>,
        details: Details,
    },

    /// An output guardrail reported a tripwire
    #[error("Output guardrail {} triggered tripwire", .result.guardrail_name)]
    OutputGuardrailTripwireTriggered {
        result: Box<OutputGuardrailResult>,
        details: Details,
    },

    /// The model produced something the runner cannot act on
    #[error("Model behavior error: {message}")]
    ModelBehavior { message: String, details: Details },

    /// The run was configured incorrectly
    #[error("User error: {message}")]
    UserError { message: String, details: Details },

    /// The model call itself failed
    #[error("Model error: {error}")]
    Model {
        error: Arc<anyhow::Error>,
        details: Details,
    },

    /// A tool invocation or hook failed
    #[error("Tool {tool_name} failed: {error}")]
    Tool {
        tool_name: String,
        error: Arc<anyhow::Error>,
        details: Details,
    },

    /// A guardrail check function returned an error
    #[error("Guardrail {guardrail_name} failed: {error}")]
    Guardrail {
        guardrail_name: String,
        error: Arc<anyhow::Error>,
        details: Details,
    },

    /// A run or agent hook returned an error
    #[error("Hook {hook} failed: {error}")]
    Hook {
        hook: &'static str,
        error: Arc<anyhow::Error>,
        details: Details,
    },

    /// Loading or saving session history failed
    #[error("Session error: {error}")]
    Session {
        error: Arc<anyhow::Error>,
        details: Details,
    },

    /// A background task panicked or was torn down by the runtime
    #[error("Internal error: {message}")]
    Internal { message: String, details: Details },

    /// A background task failed; the inner error carries the snapshot
    #[error("{task} task error: {error}")]
    Task {
        task: TaskKind,
        error: Box<AgentsError>,
    },

    /// The run was cancelled before it finished
    #[error("Run cancelled")]
    Cancelled,

    /// The stream consumer returned an error; never stored as the run error
    #[error("Stream consumer error: {0}")]
    Consumer(Arc<anyhow::Error>),
}

impl AgentsError {
    pub fn model(error: anyhow::Error) -> Self {
        AgentsError::Model {
            error: Arc::new(error),
            details: None,
        }
    }

    pub fn tool(tool_name: impl Into<String>, error: anyhow::Error) -> Self {
        AgentsError::Tool {
            tool_name: tool_name.into(),
            error: Arc::new(error),
            details: None,
        }
    }

    pub fn guardrail(guardrail_name: impl Into<String>, error: anyhow::Error) -> Self {
        AgentsError::Guardrail {
            guardrail_name: guardrail_name.into(),
            error: Arc::new(error),
            details: None,
        }
    }

    pub fn hook(hook: &'static str, error: anyhow::Error) -> Self {
        AgentsError::Hook {
            hook,
            error: Arc::new(error),
            details: None,
        }
    }

    pub fn session(error: anyhow::Error) -> Self {
        AgentsError::Session {
            error: Arc::new(error),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AgentsError::Internal {
            message: message.into(),
            details: None,
        }
    }

    pub fn model_behavior(message: impl Into<String>) -> Self {
        AgentsError::ModelBehavior {
            message: message.into(),
            details: None,
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        AgentsError::UserError {
            message: message.into(),
            details: None,
        }
    }

    pub fn task(task: TaskKind, error: AgentsError) -> Self {
        AgentsError::Task {
            task,
            error: Box::new(error),
        }
    }

    pub fn consumer(error: anyhow::Error) -> Self {
        AgentsError::Consumer(Arc::new(error))
    }

    fn details_slot(&mut self) -> Option<&mut Details> {
        match self {
            AgentsError::MaxTurnsExceeded { details, .. }
            | AgentsError::InputGuardrailTripwireTriggered { details, .. }
            | AgentsError::OutputGuardrailTripwireTriggered { details, .. }
            | AgentsError::ModelBehavior { details, .. }
            | AgentsError::UserError { details, .. }
            | AgentsError::Model { details, .. }
            | AgentsError::Tool { details, .. }
            | AgentsError::Guardrail { details, .. }
            | AgentsError::Hook { details, .. }
            | AgentsError::Session { details, .. }
            | AgentsError::Internal { details, .. } => Some(details),
            AgentsError::Task { error, .. } => error.details_slot(),
            AgentsError::Cancelled | AgentsError::Consumer(_) => None,
        }
    }

    /// Diagnostic snapshot, if one was attached
    pub fn details(&self) -> Option<&RunErrorDetails> {
        match self {
            AgentsError::MaxTurnsExceeded { details, .. }
            | AgentsError::InputGuardrailTripwireTriggered { details, .. }
            | AgentsError::OutputGuardrailTripwireTriggered { details, .. }
            | AgentsError::ModelBehavior { details, .. }
            | AgentsError::UserError { details, .. }
            | AgentsError::Model { details, .. }
            | AgentsError::Tool { details, .. }
            | AgentsError::Guardrail { details, .. }
            | AgentsError::Hook { details, .. }
            | AgentsError::Session { details, .. }
            | AgentsError::Internal { details, .. } => details.as_deref(),
            AgentsError::Task { error, .. } => error.details(),
            AgentsError::Cancelled | AgentsError::Consumer(_) => None,
        }
    }

    /// Attach a snapshot unless one is already present.
    ///
    /// The snapshot is built lazily so annotated errors pay nothing.
    pub fn with_details_if_absent(mut self, build: impl FnOnce() -> RunErrorDetails) -> Self {
        if let Some(slot) = self.details_slot() {
            if slot.is_none() {
                *slot = Some(Box::new(build()));
            }
        }
        self
    }

    /// Name of the agent that was active when the run failed
    pub fn last_agent_name(&self) -> Option<&str> {
        self.details().and_then(RunErrorDetails::last_agent_name)
    }

    /// Innermost error, looking through task wrappers
    pub fn root(&self) -> &AgentsError {
        match self {
            AgentsError::Task { error, .. } => error.root(),
            other => other,
        }
    }

    pub fn is_guardrail_tripwire(&self) -> bool {
        matches!(
            self.root(),
            AgentsError::InputGuardrailTripwireTriggered { .. }
                | AgentsError::OutputGuardrailTripwireTriggered { .. }
        )
    }
}

/// Result type alias for run operations
pub type AgentsResult<T> = Result<T, AgentsError>;

// ============================================================================
// WorkflowError - manifest, builder and service errors
// ============================================================================

/// Errors raised while validating, building or executing a workflow manifest
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The manifest failed structural validation
    #[error("{0}")]
    Validation(String),

    /// A request input could not be converted into a model input item
    #[error("convert inputs: {0}")]
    Input(String),

    /// A declaration could not be turned into a runnable object
    #[error("{0}")]
    Build(String),

    /// A callback publisher could not be created or failed to deliver
    #[error("callback error: {0}")]
    Callback(String),

    /// Execution state was missing or in the wrong status
    #[error("{0}")]
    State(String),

    /// The run itself failed
    #[error("{error}{}", last_agent_suffix(.last_agent))]
    Run {
        error: AgentsError,
        last_agent: Option<String>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn last_agent_suffix(last_agent: &Option<String>) -> String {
    match last_agent {
        Some(name) => format!(" (last agent: {})", name),
        None => String::new(),
    }
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }

    pub fn build(msg: impl Into<String>) -> Self {
        WorkflowError::Build(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        WorkflowError::State(msg.into())
    }

    /// Wrap a run error, naming the last agent when the snapshot knows it
    pub fn run(error: AgentsError) -> Self {
        let last_agent = error.last_agent_name().map(str::to_string);
        WorkflowError::Run { error, last_agent }
    }

    /// Prefix a validation or build message with a location
    pub fn context(self, prefix: impl fmt::Display) -> Self {
        match self {
            WorkflowError::Validation(msg) => WorkflowError::Validation(format!("{}: {}", prefix, msg)),
            WorkflowError::Build(msg) => WorkflowError::Build(format!("{}: {}", prefix, msg)),
            WorkflowError::Input(msg) => WorkflowError::Input(format!("{}: {}", prefix, msg)),
            other => other,
        }
    }
}

impl From<AgentsError> for WorkflowError {
    fn from(error: AgentsError) -> Self {
        WorkflowError::run(error)
    }
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(agent: &str) -> RunErrorDetails {
        RunErrorDetails {
            last_agent: Some(Arc::new(Agent::new(agent))),
            ..Default::default()
        }
    }

    #[test]
    fn test_error_display() {
        let err = AgentsError::MaxTurnsExceeded {
            max_turns: 3,
            details: None,
        };
        assert_eq!(err.to_string(), "Max turns (3) exceeded");

        let err = AgentsError::task(TaskKind::RunImpl, AgentsError::model_behavior("bad json"));
        assert_eq!(
            err.to_string(),
            "run-impl task error: Model behavior error: bad json"
        );
    }

    #[test]
    fn test_details_attached_once() {
        let err = AgentsError::model(anyhow::anyhow!("boom"))
            .with_details_if_absent(|| snapshot("first"))
            .with_details_if_absent(|| snapshot("second"));
        assert_eq!(err.last_agent_name(), Some("first"));
    }

    #[test]
    fn test_task_wrapper_delegates_details() {
        let err = AgentsError::task(
            TaskKind::OutputGuardrails,
            AgentsError::tool("lookup", anyhow::anyhow!("down")),
        )
        .with_details_if_absent(|| snapshot("triage"));
        assert_eq!(err.last_agent_name(), Some("triage"));
        assert!(matches!(err.root(), AgentsError::Tool { .. }));
    }

    #[test]
    fn test_cancelled_has_no_details() {
        let err = AgentsError::Cancelled.with_details_if_absent(|| snapshot("x"));
        assert!(err.details().is_none());
    }

    #[test]
    fn test_workflow_error_names_last_agent() {
        let err = AgentsError::model_behavior("nope").with_details_if_absent(|| snapshot("writer"));
        let wrapped = WorkflowError::run(err);
        assert_eq!(
            wrapped.to_string(),
            "Model behavior error: nope (last agent: writer)"
        );
    }

    #[test]
    fn test_workflow_error_context() {
        let err = WorkflowError::validation("name is required").context("workflow invalid");
        assert_eq!(err.to_string(), "workflow invalid: name is required");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WorkflowError = io_err.into();
        assert!(matches!(err, WorkflowError::Io(_)));
    }
}
