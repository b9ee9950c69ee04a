//! Result of a finished run

use std::sync::Arc;

use serde_json::Value;

use crate::agent::Agent;
use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use crate::items::{self, InputItem, ModelResponse, RunItem, Usage};

/// Immutable snapshot of a completed run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub input: Vec<InputItem>,
    pub new_items: Vec<RunItem>,
    pub raw_responses: Vec<ModelResponse>,
    /// `Null` when the run produced no final output
    pub final_output: Value,
    pub input_guardrail_results: Vec<InputGuardrailResult>,
    pub output_guardrail_results: Vec<OutputGuardrailResult>,
    pub last_agent: Option<Arc<Agent>>,
    pub usage: Usage,
}

impl RunResult {
    /// Original input followed by every new item, ready for the next run
    pub fn to_input_list(&self) -> Vec<InputItem> {
        items::to_input_list(&self.input, &self.new_items)
    }

    pub fn last_response_id(&self) -> String {
        items::last_response_id(&self.raw_responses)
    }

    pub fn last_agent_name(&self) -> Option<&str> {
        self.last_agent.as_deref().map(|agent| agent.name.as_str())
    }

    /// Final output rendered as text; strings are returned unquoted
    pub fn final_output_text(&self) -> String {
        match &self.final_output {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}
