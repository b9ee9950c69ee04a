//! Runner service: build a manifest, run it, publish and track the run

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::agent::Agent;
use crate::cli::ConsolePrinter;
use crate::core::{ExecutionStatus, WorkflowError, WorkflowResult};
use crate::items::{Input, InputItem, RunItem};
use crate::manifest::{build_input_items, Builder, CallbackDeclaration, WorkflowRequest};
use crate::runtime::{Runner, StreamEvent};

use super::callback::{
    publisher_for, CallbackEvent, CallbackFactory, CallbackPublisher, MultiCallbackPublisher, RUN_COMPLETED,
    RUN_EVENT, RUN_FAILED, RUN_STARTED,
};
use super::serialize::serialize_stream_event;
use super::state::{
    ApprovalRequestState, ExecutionStateStore, ExecutionStateTracker, InMemoryExecutionStateStore,
    WorkflowExecutionState,
};

/// Outcome of a successful workflow run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workflow_name: String,
    pub session_id: String,
    pub run_id: String,
    pub resume_token: String,
    pub final_output: Option<Value>,
    #[serde(skip)]
    pub new_items: Vec<RunItem>,
    pub last_response_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Builds and executes workflow requests, keeping per-session state
#[derive(Clone)]
pub struct RunnerService {
    builder: Builder,
    state_store: Arc<dyn ExecutionStateStore>,
    callback_factory: CallbackFactory,
}

impl RunnerService {
    /// Service with an in-memory state store and the default publishers
    pub fn new(builder: Builder) -> Self {
        Self {
            builder,
            state_store: Arc::new(InMemoryExecutionStateStore::new()),
            callback_factory: Arc::new(publisher_for),
        }
    }

    pub fn with_state_store(mut self, store: Arc<dyn ExecutionStateStore>) -> Self {
        self.state_store = store;
        self
    }

    pub fn with_callback_factory(mut self, factory: CallbackFactory) -> Self {
        self.callback_factory = factory;
        self
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    pub async fn get_execution_state(&self, session_id: &str) -> WorkflowResult<Option<WorkflowExecutionState>> {
        self.state_store.load(session_id).await
    }

    pub async fn clear_execution_state(&self, session_id: &str) -> WorkflowResult<()> {
        self.state_store.clear(session_id).await
    }

    async fn require_state(&self, session_id: &str) -> WorkflowResult<WorkflowExecutionState> {
        self.state_store
            .load(session_id)
            .await?
            .ok_or_else(|| WorkflowError::state(format!("no execution state for session {:?}", session_id)))
    }

    pub async fn pending_approvals(&self, session_id: &str) -> WorkflowResult<Vec<ApprovalRequestState>> {
        Ok(self.require_state(session_id).await?.pending_approvals)
    }

    /// Drop one pending approval. Once none remain, a waiting session becomes
    /// idle when approved or failed when rejected.
    pub async fn resolve_approval(&self, session_id: &str, approval_id: &str, approve: bool) -> WorkflowResult<()> {
        let mut state = self.require_state(session_id).await?;
        if state.pending_approvals.is_empty() {
            return Err(WorkflowError::state(format!(
                "no pending approvals for session {:?}",
                session_id
            )));
        }
        let before = state.pending_approvals.len();
        state.pending_approvals.retain(|a| a.request_id != approval_id);
        if state.pending_approvals.len() == before {
            return Err(WorkflowError::state(format!(
                "approval id {:?} not found in session {:?}",
                approval_id, session_id
            )));
        }
        if state.pending_approvals.is_empty() && state.status == ExecutionStatus::WaitingApproval {
            state.status = if approve {
                ExecutionStatus::Idle
            } else {
                ExecutionStatus::Failed
            };
        }
        state.updated_at = Utc::now();
        tracing::info!(
            session_id = %session_id,
            approval_id = %approval_id,
            approve,
            status = %state.status,
            "[RunnerService] Approval resolved"
        );
        self.state_store.save(state).await
    }

    /// Check `request` against the stored state, then execute it
    pub async fn resume(&self, request: WorkflowRequest) -> WorkflowResult<JoinHandle<WorkflowResult<RunSummary>>> {
        let session_id = request.session.session_id.trim();
        if session_id.is_empty() {
            return Err(WorkflowError::state("session.session_id is required for resume"));
        }
        let resume_token = request.session.resume_token.trim();
        if resume_token.is_empty() {
            return Err(WorkflowError::state("session.resume_token is required for resume"));
        }
        let state = self.require_state(session_id).await?;
        if state.resume_token.trim() != resume_token {
            return Err(WorkflowError::state("resume token does not match stored state"));
        }
        if !state.status.is_resumable() {
            return Err(WorkflowError::state(format!(
                "session status {:?} cannot be resumed",
                state.status.as_str()
            )));
        }
        let requested = &request.workflow.name;
        if !state.workflow_name.is_empty() && !requested.is_empty() && &state.workflow_name != requested {
            return Err(WorkflowError::state(format!(
                "workflow name mismatch: stored={:?} request={:?}",
                state.workflow_name, requested
            )));
        }
        tracing::info!(session_id = %session_id, status = %state.status, "[RunnerService] Resuming session");
        self.execute(request)
    }

    /// Build `request` and start running it in the background.
    ///
    /// Build, input and publisher errors are returned before anything runs.
    /// The task resolves to the run summary or the run's error.
    pub fn execute(&self, request: WorkflowRequest) -> WorkflowResult<JoinHandle<WorkflowResult<RunSummary>>> {
        let built = self.builder.build(&request)?;
        let input_items = build_input_items(&request.inputs)?;

        let mut publishers: Vec<Arc<dyn CallbackPublisher>> = Vec::new();
        let (mut has_stdout, mut verbose, mut has_other) = (false, false, false);
        for (i, decl) in request.all_callbacks().into_iter().enumerate() {
            match decl.mode().as_str() {
                "stdout" => has_stdout = true,
                "stdout_verbose" => {
                    has_stdout = true;
                    verbose = true;
                }
                _ => has_other = true,
            }
            let publisher = self.create_publisher(decl).map_err(|e| {
                WorkflowError::Callback(format!("create callback publisher[{}]: {}", i, callback_message(e)))
            })?;
            publishers.push(publisher);
        }

        let session_id = request.session.session_id.clone();
        let run_id = uuid::Uuid::new_v4().to_string();
        let resume_token = if session_id.trim().is_empty() {
            run_id.clone()
        } else {
            format!("{}:{}", session_id, run_id)
        };
        let runner = Runner::new(built.runner.config().clone().with_trace_id(run_id.clone()));

        tracing::info!(
            workflow = %request.workflow.name,
            session_id = %session_id,
            run_id = %run_id,
            publishers = publishers.len(),
            "[RunnerService] Executing workflow"
        );

        let run = WorkflowRun {
            tracker: ExecutionStateTracker::new(self.state_store.clone(), &session_id, &request.workflow.name),
            publisher: MultiCallbackPublisher::new(publishers),
            skip_publishing: has_stdout && !has_other,
            printer: ConsolePrinter::new(has_stdout, verbose),
            starting_agent: built.starting_agent,
            runner,
            input_items,
            request,
            run_id,
            resume_token,
        };
        Ok(tokio::spawn(run.run()))
    }

    fn create_publisher(&self, decl: &CallbackDeclaration) -> WorkflowResult<Arc<dyn CallbackPublisher>> {
        (self.callback_factory)(decl)
    }
}

fn callback_message(error: WorkflowError) -> String {
    match error {
        WorkflowError::Callback(message) => message,
        other => other.to_string(),
    }
}

/// Everything one background run needs
struct WorkflowRun {
    request: WorkflowRequest,
    runner: Runner,
    starting_agent: Arc<Agent>,
    input_items: Vec<InputItem>,
    publisher: MultiCallbackPublisher,
    skip_publishing: bool,
    printer: ConsolePrinter,
    tracker: ExecutionStateTracker,
    run_id: String,
    resume_token: String,
}

impl WorkflowRun {
    async fn publish(&self, event_type: &str, payload: Value) {
        if self.skip_publishing {
            return;
        }
        if let Err(e) = self.publisher.publish(&CallbackEvent::new(event_type, payload)).await {
            tracing::warn!(event = %event_type, error = %e, "[RunnerService] Callback publish failed");
        }
    }

    async fn run(self) -> WorkflowResult<RunSummary> {
        let request = &self.request;
        let started_at = Utc::now();
        self.tracker
            .on_run_started(&self.run_id, &self.resume_token, &request.query, started_at)
            .await?;
        self.printer.on_run_started(&request.query);
        self.publish(
            RUN_STARTED,
            json!({
                "workflow": request.workflow.name,
                "session": request.session.session_id,
                "query": request.query,
                "run_id": self.run_id,
                "resume_token": self.resume_token,
            }),
        )
        .await;

        let input = if self.input_items.is_empty() {
            Input::from(request.query.as_str())
        } else {
            Input::from(self.input_items.clone())
        };
        let streaming = self.runner.run_streamed(self.starting_agent.clone(), input);

        let this = &self;
        let streamed = streaming
            .stream_events(move |event: StreamEvent| async move {
                this.tracker.on_stream_event(&event).await?;
                this.printer.on_stream_event(&event);
                if !this.skip_publishing {
                    this.publisher
                        .publish(&CallbackEvent::new(RUN_EVENT, serialize_stream_event(&event)))
                        .await?;
                }
                Ok::<(), anyhow::Error>(())
            })
            .await;

        if let Err(e) = streamed {
            let error = WorkflowError::run(e);
            tracing::error!(
                workflow = %request.workflow.name,
                run_id = %self.run_id,
                error = %error,
                "[RunnerService] Run failed"
            );
            let message = error.to_string();
            self.publish(RUN_FAILED, json!({ "error": message })).await;
            if let Err(state_err) = self.tracker.on_run_failed(&message).await {
                tracing::warn!(error = %state_err, "[RunnerService] Could not record failure");
            }
            self.printer.on_run_failed(&error);
            return Err(error);
        }

        let final_output = streaming.final_output();
        let last_response_id = streaming.last_response_id();
        self.publish(
            RUN_COMPLETED,
            json!({
                "final_output": final_output,
                "last_response_id": last_response_id,
                "run_id": self.run_id,
                "resume_token": self.resume_token,
            }),
        )
        .await;
        if let Err(e) = self
            .tracker
            .on_run_completed(&last_response_id, final_output.clone())
            .await
        {
            tracing::warn!(error = %e, "[RunnerService] Could not record completion");
        }
        let last_agent = streaming.last_agent();
        self.printer
            .on_run_completed(final_output.as_ref(), last_agent.as_ref().map(|a| a.name.as_str()));
        tracing::info!(
            workflow = %request.workflow.name,
            run_id = %self.run_id,
            "[RunnerService] Run completed"
        );

        Ok(RunSummary {
            workflow_name: request.workflow.name.clone(),
            session_id: request.session.session_id.clone(),
            run_id: self.run_id.clone(),
            resume_token: self.resume_token.clone(),
            final_output,
            new_items: streaming.new_items(),
            last_response_id,
            started_at,
            completed_at: Some(Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{McpApprovalRequest, OutputItem};
    use crate::llm::{Model, ScriptedModel, StaticModelProvider};
    use crate::manifest::{AgentDeclaration, InstructionDeclaration, WorkflowInput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CallbackEvent>>,
    }

    impl Recorder {
        fn types(&self) -> Vec<String> {
            self.events.lock().unwrap().iter().map(|e| e.event_type.clone()).collect()
        }
    }

    #[async_trait]
    impl CallbackPublisher for Recorder {
        async fn publish(&self, event: &CallbackEvent) -> WorkflowResult<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn request() -> WorkflowRequest {
        let mut request = WorkflowRequest {
            query: "hello".into(),
            inputs: vec![WorkflowInput {
                input_type: "text".into(),
                content: Some(json!("hello")),
                ..Default::default()
            }],
            callback: CallbackDeclaration::url("http://localhost:9/callback"),
            ..Default::default()
        };
        request.session.session_id = "s-1".into();
        request.session.credentials.user_id = "u-1".into();
        request.session.credentials.account_id = "a-1".into();
        request.workflow.name = "demo".into();
        request.workflow.starting_agent = "assistant".into();
        request.workflow.agents = vec![AgentDeclaration {
            name: "assistant".into(),
            instructions: InstructionDeclaration::text("Be helpful"),
            ..Default::default()
        }];
        request
    }

    fn service(model: ScriptedModel) -> (RunnerService, Arc<Recorder>) {
        let model: Arc<dyn Model> = Arc::new(model);
        let recorder = Arc::new(Recorder::default());
        let shared = recorder.clone();
        let service = RunnerService::new(Builder::new().with_model_provider(Arc::new(StaticModelProvider::new(model))))
            .with_callback_factory(Arc::new(move |_decl: &CallbackDeclaration| {
                let publisher: Arc<dyn CallbackPublisher> = shared.clone();
                Ok::<_, WorkflowError>(publisher)
            }));
        (service, recorder)
    }

    fn approval_output(id: &str) -> Vec<OutputItem> {
        vec![OutputItem::McpApprovalRequest(McpApprovalRequest {
            id: id.into(),
            server_label: "files".into(),
            name: "list_files".into(),
            arguments: "{}".into(),
        })]
    }

    #[tokio::test]
    async fn test_execute_publishes_lifecycle() {
        let (service, recorder) = service(ScriptedModel::new().then_message("Hi there"));
        let summary = service.execute(request()).unwrap().await.unwrap().unwrap();

        assert_eq!(summary.final_output, Some(json!("Hi there")));
        assert_eq!(summary.resume_token, format!("s-1:{}", summary.run_id));
        assert_eq!(summary.last_response_id, "resp_1");

        let types = recorder.types();
        assert_eq!(types.first().map(String::as_str), Some(RUN_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(RUN_COMPLETED));
        assert!(types[1..types.len() - 1].iter().all(|t| t == RUN_EVENT));
        assert!(types.len() > 2);

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events[0].payload["workflow"], json!("demo"));
        assert_eq!(events[0].payload["run_id"], json!(summary.run_id));
        assert_eq!(events.last().unwrap().payload["final_output"], json!("Hi there"));

        let state = service.get_execution_state("s-1").await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Idle);
        assert_eq!(state.resume_token, summary.resume_token);
    }

    #[tokio::test]
    async fn test_failed_run_publishes_failure() {
        let (service, recorder) = service(ScriptedModel::new().then_error("rate limited"));
        let err = service.execute(request()).unwrap().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("rate limited"), "{}", err);

        let types = recorder.types();
        assert_eq!(types.first().map(String::as_str), Some(RUN_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(RUN_FAILED));
        assert_eq!(types.iter().filter(|t| *t == RUN_COMPLETED).count(), 0);

        let state = service.get_execution_state("s-1").await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert!(state.last_error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_stdout_only_skips_publishing() {
        let (service, recorder) = service(ScriptedModel::new().then_message("quiet"));
        let mut request = request();
        request.callback = CallbackDeclaration::stdout();
        let summary = service.execute(request).unwrap().await.unwrap().unwrap();
        assert_eq!(summary.final_output, Some(json!("quiet")));
        assert!(recorder.types().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_callback_mode() {
        let service = RunnerService::new(Builder::new());
        let mut request = request();
        request.callback.mode = "kafka".into();
        let err = service.execute(request).err().unwrap();
        assert_eq!(
            err.to_string(),
            "callback error: create callback publisher[0]: unsupported callback mode \"kafka\""
        );
    }

    #[tokio::test]
    async fn test_pending_approval_then_resume() {
        let model = ScriptedModel::new()
            .then_output(approval_output("appr_1"))
            .then_message("Files listed");
        let (service, _) = service(model);

        let summary = service.execute(request()).unwrap().await.unwrap().unwrap();
        assert_eq!(summary.final_output, None);

        let state = service.get_execution_state("s-1").await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::WaitingApproval);
        let pending = service.pending_approvals("s-1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id, "appr_1");
        assert_eq!(pending[0].tool_name, "list_files");
        assert_eq!(pending[0].agent_name, "assistant");

        let err = service.resolve_approval("s-1", "nope", true).await.unwrap_err();
        assert_eq!(err.to_string(), "approval id \"nope\" not found in session \"s-1\"");

        let mut resume = request();
        resume.session.resume_token = "s-1:wrong".into();
        let err = service.resume(resume.clone()).await.err().unwrap();
        assert_eq!(err.to_string(), "resume token does not match stored state");

        resume.session.resume_token = summary.resume_token.clone();
        let resumed = service.resume(resume).await.unwrap().await.unwrap().unwrap();
        assert_eq!(resumed.final_output, Some(json!("Files listed")));
        assert_ne!(resumed.run_id, summary.run_id);
        let state = service.get_execution_state("s-1").await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Idle);
        assert!(state.pending_approvals.is_empty());
    }

    #[tokio::test]
    async fn test_rejecting_last_approval_fails_session() {
        let (service, _) = service(ScriptedModel::new().then_output(approval_output("appr_1")));
        service.execute(request()).unwrap().await.unwrap().unwrap();

        service.resolve_approval("s-1", "appr_1", false).await.unwrap();
        let state = service.get_execution_state("s-1").await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Failed);

        let err = service.resolve_approval("s-1", "appr_1", true).await.unwrap_err();
        assert_eq!(err.to_string(), "no pending approvals for session \"s-1\"");
    }

    #[tokio::test]
    async fn test_resume_checks() {
        let (service, _) = service(ScriptedModel::new().then_message("done"));
        let mut resume = request();
        resume.session.resume_token = "token".into();
        let err = service.resume(resume.clone()).await.err().unwrap();
        assert_eq!(err.to_string(), "no execution state for session \"s-1\"");

        let summary = service.execute(request()).unwrap().await.unwrap().unwrap();
        resume.session.resume_token = summary.resume_token.clone();
        let err = service.resume(resume.clone()).await.err().unwrap();
        assert_eq!(err.to_string(), "session status \"idle\" cannot be resumed");

        let mut state = service.get_execution_state("s-1").await.unwrap().unwrap();
        state.status = ExecutionStatus::Failed;
        state.workflow_name = "other".into();
        service.state_store.save(state).await.unwrap();
        let err = service.resume(resume).await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "workflow name mismatch: stored=\"other\" request=\"demo\""
        );

        service.clear_execution_state("s-1").await.unwrap();
        assert!(service.get_execution_state("s-1").await.unwrap().is_none());
    }
}
