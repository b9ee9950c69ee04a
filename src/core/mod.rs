//! Core types for the workflow runner
//!
//! This module provides the fundamental types used throughout the crate:
//! - `RunContext` - Caller state and resources shared with tools
//! - `ExecutionStatus` - Externally tracked status of a session
//! - `AgentsError` / `WorkflowError` - Error types

pub mod context;
pub mod error;
pub mod state;

pub use context::{ResourceMap, RunContext};
pub use error::{
    AgentsError, AgentsResult, RunErrorDetails, TaskKind, WorkflowError, WorkflowResult,
};
pub use state::ExecutionStatus;
