//! Workflow execution service
//!
//! This module provides:
//! - `RunnerService` - Build a manifest, run it in the background, resume it
//! - `CallbackPublisher` and friends - Deliver lifecycle events
//! - `ExecutionStateStore` / `ExecutionStateTracker` - Per-session status,
//!   pending approvals and resume tokens
//! - `serialize_stream_event` - Compact `run.event` payloads

mod callback;
mod runner;
mod serialize;
mod state;

pub use callback::{
    publisher_for, CallbackEvent, CallbackFactory, CallbackPublisher, HttpCallbackPublisher, MultiCallbackPublisher,
    StdoutCallbackPublisher, RUN_COMPLETED, RUN_EVENT, RUN_FAILED, RUN_STARTED,
};
pub use runner::{RunSummary, RunnerService};
pub use serialize::{serialize_stream_event, summarize_run_item};
pub use state::{
    ApprovalRequestState, ExecutionStateStore, ExecutionStateTracker, InMemoryExecutionStateStore,
    WorkflowExecutionState,
};
