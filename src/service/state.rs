//! Per-session execution state
//!
//! The tracker turns run lifecycle events into store updates so callers can
//! tell whether a session is running, finished, failed or blocked on
//! approvals, and hand back the resume token.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::core::{ExecutionStatus, WorkflowResult};
use crate::items::RunItem;
use crate::runtime::StreamEvent;

/// An MCP approval request the run could not answer by itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequestState {
    pub request_id: String,
    pub agent_name: String,
    pub tool_name: String,
    pub server_label: String,
    pub arguments: String,
    pub requested_at: DateTime<Utc>,
}

/// Latest known state of a session's run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionState {
    pub session_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub run_id: String,
    pub resume_token: String,
    pub query: String,
    pub last_response_id: String,
    pub final_output: Option<Value>,
    pub last_error: Option<String>,
    pub pending_approvals: Vec<ApprovalRequestState>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecutionState {
    pub fn new(session_id: impl Into<String>, workflow_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workflow_name: workflow_name.into(),
            status: ExecutionStatus::Idle,
            run_id: String::new(),
            resume_token: String::new(),
            query: String::new(),
            last_response_id: String::new(),
            final_output: None,
            last_error: None,
            pending_approvals: Vec::new(),
            started_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// Storage for execution state, keyed by session id
#[async_trait]
pub trait ExecutionStateStore: Send + Sync {
    async fn load(&self, session_id: &str) -> WorkflowResult<Option<WorkflowExecutionState>>;
    async fn save(&self, state: WorkflowExecutionState) -> WorkflowResult<()>;
    async fn clear(&self, session_id: &str) -> WorkflowResult<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryExecutionStateStore {
    states: RwLock<HashMap<String, WorkflowExecutionState>>,
}

impl InMemoryExecutionStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStateStore for InMemoryExecutionStateStore {
    async fn load(&self, session_id: &str) -> WorkflowResult<Option<WorkflowExecutionState>> {
        Ok(self.states.read().await.get(session_id).cloned())
    }

    async fn save(&self, state: WorkflowExecutionState) -> WorkflowResult<()> {
        self.states.write().await.insert(state.session_id.clone(), state);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> WorkflowResult<()> {
        self.states.write().await.remove(session_id);
        Ok(())
    }
}

/// Applies run lifecycle events of one session to a store
pub struct ExecutionStateTracker {
    store: Arc<dyn ExecutionStateStore>,
    state: Mutex<WorkflowExecutionState>,
}

impl ExecutionStateTracker {
    pub fn new(store: Arc<dyn ExecutionStateStore>, session_id: &str, workflow_name: &str) -> Self {
        Self {
            store,
            state: Mutex::new(WorkflowExecutionState::new(session_id, workflow_name)),
        }
    }

    /// A new run begins; approvals left by an earlier run are dropped
    pub async fn on_run_started(
        &self,
        run_id: &str,
        resume_token: &str,
        query: &str,
        started_at: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let mut state = self.state.lock().await;
        if let Some(stored) = self.store.load(&state.session_id).await? {
            let workflow_name = std::mem::take(&mut state.workflow_name);
            *state = stored;
            if !workflow_name.is_empty() {
                state.workflow_name = workflow_name;
            }
        }
        state.status = ExecutionStatus::Running;
        state.run_id = run_id.to_string();
        state.resume_token = resume_token.to_string();
        state.query = query.to_string();
        state.last_response_id.clear();
        state.final_output = None;
        state.last_error = None;
        state.pending_approvals.clear();
        state.started_at = Some(started_at);
        self.save(&mut state).await
    }

    /// Track approval requests and their answers
    pub async fn on_stream_event(&self, event: &StreamEvent) -> WorkflowResult<()> {
        let StreamEvent::RunItem { item, .. } = event else {
            return Ok(());
        };
        let mut state = self.state.lock().await;
        match item {
            RunItem::McpApprovalRequest { agent, raw_item } => {
                tracing::info!(
                    session_id = %state.session_id,
                    request_id = %raw_item.id,
                    tool = %raw_item.name,
                    "[ExecutionState] Approval requested"
                );
                state.pending_approvals.retain(|a| a.request_id != raw_item.id);
                state.pending_approvals.push(ApprovalRequestState {
                    request_id: raw_item.id.clone(),
                    agent_name: agent.clone(),
                    tool_name: raw_item.name.clone(),
                    server_label: raw_item.server_label.clone(),
                    arguments: raw_item.arguments.clone(),
                    requested_at: Utc::now(),
                });
                state.status = ExecutionStatus::WaitingApproval;
            }
            RunItem::McpApprovalResponse { raw_item, .. } => {
                state
                    .pending_approvals
                    .retain(|a| a.request_id != raw_item.approval_request_id);
                if state.pending_approvals.is_empty() && state.status == ExecutionStatus::WaitingApproval {
                    state.status = ExecutionStatus::Running;
                }
            }
            _ => return Ok(()),
        }
        self.save(&mut state).await
    }

    pub async fn on_run_completed(&self, last_response_id: &str, final_output: Option<Value>) -> WorkflowResult<()> {
        let mut state = self.state.lock().await;
        state.status = if state.pending_approvals.is_empty() {
            ExecutionStatus::Idle
        } else {
            ExecutionStatus::WaitingApproval
        };
        state.last_response_id = last_response_id.to_string();
        state.final_output = final_output;
        state.last_error = None;
        self.save(&mut state).await
    }

    pub async fn on_run_failed(&self, error: &str) -> WorkflowResult<()> {
        let mut state = self.state.lock().await;
        state.status = ExecutionStatus::Failed;
        state.last_error = Some(error.to_string());
        self.save(&mut state).await
    }

    /// Copy of the tracked state
    pub async fn snapshot(&self) -> WorkflowExecutionState {
        self.state.lock().await.clone()
    }

    async fn save(&self, state: &mut WorkflowExecutionState) -> WorkflowResult<()> {
        state.updated_at = Utc::now();
        if state.session_id.is_empty() {
            return Ok(());
        }
        self.store.save(state.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{McpApprovalRequest, McpApprovalResponse};
    use serde_json::json;

    fn approval_request(id: &str) -> StreamEvent {
        StreamEvent::for_item(RunItem::McpApprovalRequest {
            agent: "assistant".into(),
            raw_item: McpApprovalRequest {
                id: id.into(),
                server_label: "files".into(),
                name: "list".into(),
                arguments: "{}".into(),
            },
        })
    }

    fn approval_response(id: &str) -> StreamEvent {
        StreamEvent::for_item(RunItem::McpApprovalResponse {
            agent: "assistant".into(),
            raw_item: McpApprovalResponse {
                approval_request_id: id.into(),
                approve: true,
                reason: None,
            },
        })
    }

    async fn stored(store: &Arc<InMemoryExecutionStateStore>) -> WorkflowExecutionState {
        store.load("s-1").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_to_idle() {
        let store = Arc::new(InMemoryExecutionStateStore::new());
        let tracker = ExecutionStateTracker::new(store.clone(), "s-1", "demo");

        tracker.on_run_started("r1", "s-1:r1", "hi", Utc::now()).await.unwrap();
        let state = stored(&store).await;
        assert_eq!(state.status, ExecutionStatus::Running);
        assert_eq!(state.resume_token, "s-1:r1");
        assert_eq!(state.workflow_name, "demo");

        tracker.on_run_completed("resp_1", Some(json!("done"))).await.unwrap();
        let state = stored(&store).await;
        assert_eq!(state.status, ExecutionStatus::Idle);
        assert_eq!(state.final_output, Some(json!("done")));
        assert_eq!(state.last_response_id, "resp_1");
    }

    #[tokio::test]
    async fn test_unanswered_approval_waits() {
        let store = Arc::new(InMemoryExecutionStateStore::new());
        let tracker = ExecutionStateTracker::new(store.clone(), "s-1", "demo");
        tracker.on_run_started("r1", "s-1:r1", "hi", Utc::now()).await.unwrap();

        tracker.on_stream_event(&approval_request("a1")).await.unwrap();
        tracker.on_stream_event(&approval_request("a2")).await.unwrap();
        assert_eq!(stored(&store).await.status, ExecutionStatus::WaitingApproval);

        tracker.on_stream_event(&approval_response("a1")).await.unwrap();
        tracker.on_run_completed("resp_1", None).await.unwrap();

        let state = stored(&store).await;
        assert_eq!(state.status, ExecutionStatus::WaitingApproval);
        assert_eq!(state.pending_approvals.len(), 1);
        assert_eq!(state.pending_approvals[0].request_id, "a2");
        assert_eq!(state.pending_approvals[0].server_label, "files");
    }

    #[tokio::test]
    async fn test_answered_approval_and_failure() {
        let store = Arc::new(InMemoryExecutionStateStore::new());
        let tracker = ExecutionStateTracker::new(store.clone(), "s-1", "demo");
        tracker.on_run_started("r1", "s-1:r1", "hi", Utc::now()).await.unwrap();
        tracker.on_stream_event(&approval_request("a1")).await.unwrap();
        tracker.on_stream_event(&approval_response("a1")).await.unwrap();
        assert_eq!(stored(&store).await.status, ExecutionStatus::Running);

        // Runs record failures from inside spawned tasks
        fn send<F: std::future::Future + Send>(fut: F) -> F {
            fut
        }
        send(tracker.on_run_failed("model exploded")).await.unwrap();
        let state = stored(&store).await;
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.last_error.as_deref(), Some("model exploded"));
        assert!(state.pending_approvals.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryExecutionStateStore::new();
        store.save(WorkflowExecutionState::new("s-1", "demo")).await.unwrap();
        assert!(store.load("s-1").await.unwrap().is_some());
        store.clear("s-1").await.unwrap();
        assert!(store.load("s-1").await.unwrap().is_none());
    }
}
