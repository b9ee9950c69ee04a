//! Model capability
//!
//! - `Model` / `ModelProvider` - traits the runner calls
//! - `ModelRequest` / `ResponseEvent` / `ToolDefinition` - wire types
//! - `ModelSettings` - tuning parameters
//! - `ScriptedModel` / `EchoModel` - offline models

pub mod provider;
pub mod scripted;
pub mod settings;
pub mod types;

pub use provider::{replay_response, Model, ModelProvider, ResponseStream, StaticModelProvider};
pub use scripted::{EchoModel, ScriptedModel};
pub use settings::{ModelSettings, ReasoningSettings, Verbosity};
pub use types::{ModelRequest, ResponseEvent, ToolDefinition};
