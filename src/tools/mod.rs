//! Tool system for agents
//!
//! This module provides:
//! - `Tool` trait - Interface every tool implements
//! - `ToolResult` / `ToolContext` - What a call returns and what it can see
//! - `FunctionTool` - Closure-backed tools over JSON arguments
//! - `HostedTool` / `HostedMcpTool` - Descriptors for provider-side tools
//! - `ComputerTool` / `LocalShellTool` - Tools driving a screen or a shell
//! - `AgentTool` - Another agent exposed as a tool
//! - `ToolRegistry` - Name-keyed lookup for manifest references

mod agent_tool;
mod computer;
mod function;
mod hosted;
mod local_shell;
mod registry;
mod tool;

pub use agent_tool::{AgentTool, AgentToolOptions, OutputExtractor};
pub use computer::{Computer, ComputerTool};
pub use function::FunctionTool;
pub use hosted::{HostedMcpTool, HostedTool, McpApprovalDecision, McpApprovalHandler};
pub use local_shell::{LocalShellExecutor, LocalShellTool, ProcessShellExecutor};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolContext, ToolKind, ToolResult};
