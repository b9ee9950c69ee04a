//! Run engine
//!
//! This module provides the machinery behind a streamed run:
//! - `Runner` / `RunConfig` - Start runs of an agent graph
//! - `RunResultStreaming` - Caller handle on an in-flight run
//! - `RunResult` - Frozen outcome of a finished run
//! - `StreamEvent` - What a streaming consumer receives
//! - `AsyncQueue` / `BackgroundTask` - Event plumbing and task handles
//!
//! A run is one run-impl task plus, on demand, an input-guardrail task and an
//! output-guardrail task. They talk to the caller only through the shared
//! streaming state.

mod events;
mod queue;
mod result;
mod runner;
mod streaming;
mod task;
mod turn;

pub use events::{RunItemEventName, StreamEvent};
pub use queue::{AsyncQueue, QueueClosed};
pub use result::RunResult;
pub use runner::{RunConfig, Runner, DEFAULT_MAX_TURNS, DEFAULT_WORKFLOW_NAME};
pub use streaming::RunResultStreaming;
pub use task::{BackgroundTask, TaskOutcome};
