//! Declarative workflow manifests
//!
//! This module provides:
//! - `WorkflowRequest` and its declarations - The JSON manifest format
//! - `validate_workflow_request` - Structural checks with path-prefixed messages
//! - `build_input_items` - Manifest inputs to model input items
//! - `Builder` - Registries and the manifest-to-agents build step
//!
//! # Example
//!
//! ```ignore
//! let request = WorkflowRequest::from_json(&std::fs::read_to_string("manifest.json")?)?;
//! let built = Builder::new()
//!     .with_function_tool("get_weather", weather_factory)
//!     .build(&request)?;
//! let result = built.runner.run(built.starting_agent.clone(), request.query.as_str()).await?;
//! ```

mod builder;
mod input;
mod template;
mod types;
mod validate;

pub use builder::{
    hosted_mcp_from_declaration, hosted_mcp_tool, BuildResult, Builder, InputGuardrailFactory, OutputGuardrailFactory,
    OutputTypeFactory, ToolFactory, ToolFactoryEnv,
};
pub use input::build_input_items;
pub use template::render_instructions;
pub use types::{
    AgentDeclaration, AgentHandoffDeclaration, AgentHandoffDeclarations, AgentToolReference, CallbackDeclaration,
    CallbackRetryPolicy, CredentialDeclaration, GuardrailDeclaration, InstructionDeclaration,
    InstructionTemplateDeclaration, McpDeclaration, ModelDeclaration, OutputTypeDeclaration, ReasoningDeclaration,
    SessionDeclaration, ToolApprovalFlowDeclaration, ToolDeclaration, ToolUseBehaviorDeclaration,
    WorkflowDeclaration, WorkflowInput, WorkflowRequest, CURRENT_WORKFLOW_VERSION,
};
pub use validate::{check_callback, validate_workflow_request};
