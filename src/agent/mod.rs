pub mod definition;
pub mod handoff;
pub mod output_type;
pub mod tool_use;

pub use definition::{Agent, AgentModel};
pub use handoff::{
    default_tool_description, default_tool_name, remove_all_tools, snake_case, AgentDirectory, Handoff,
    HandoffInputData, HandoffInputFilter,
};
pub use output_type::{JsonObjectOutputType, OutputType, SchemaOutputType};
pub use tool_use::ToolUseBehavior;
