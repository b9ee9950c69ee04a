//! Hooks Module
//!
//! Observe and veto a run at key execution points.
//!
//! # Overview
//!
//! Hooks let you:
//! - Log and audit model calls, tool calls and handoffs
//! - Abort a run by returning an error from any callback
//! - Scope tool callbacks to a subset of tools
//!
//! # Example
//!
//! ```ignore
//! use agent_workflow_runner::hooks::{AgentHooks, ToolScopedHooks};
//!
//! struct AuditHooks;
//!
//! #[async_trait]
//! impl AgentHooks for AuditHooks {
//!     async fn on_tool_start(&self, _ctx: &RunContext, agent: &Agent, tool: &dyn Tool, args: &str) -> Result<()> {
//!         tracing::info!("{} calls {} with {}", agent.name, tool.name(), args);
//!         Ok(())
//!     }
//! }
//!
//! let hooks = ToolScopedHooks::with_pattern("^get_", Arc::new(AuditHooks))?;
//! let agent = Agent::new("assistant").with_hooks(Arc::new(hooks));
//! ```
//!
//! # Callbacks
//!
//! | Run hook | Agent hook | When |
//! |----------|------------|------|
//! | `on_agent_start` | `on_start` | An agent becomes active |
//! | `on_agent_end` | `on_end` | An agent produced the final output |
//! | `on_handoff` | `on_handoff` | Control moves to another agent |
//! | `on_tool_start` | `on_tool_start` | Before a local tool runs |
//! | `on_tool_end` | `on_tool_end` | After a local tool returned |
//! | `on_llm_start` | `on_llm_start` | Before a model call |
//! | `on_llm_end` | `on_llm_end` | After a model call |

mod registry;
mod types;

pub use registry::{CombinedAgentHooks, CombinedRunHooks, ToolScopedHooks};
pub use types::{AgentHooks, RunHooks};
