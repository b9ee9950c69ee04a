//! What happens after local tools ran

use serde_json::Value;

use crate::tools::ToolResult;

/// Whether tool results go back to the model or end the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolUseBehavior {
    /// Send tool results back to the model
    #[default]
    RunLlmAgain,
    /// The first tool result is the final output
    StopOnFirstTool,
    /// A result from one of these tools is the final output
    StopAtTools(Vec<String>),
}

impl ToolUseBehavior {
    /// Final output chosen from `(tool name, result)` pairs, in call order
    pub fn final_output(&self, results: &[(String, ToolResult)]) -> Option<Value> {
        match self {
            ToolUseBehavior::RunLlmAgain => None,
            ToolUseBehavior::StopOnFirstTool => results.first().map(|(_, r)| r.output.clone()),
            ToolUseBehavior::StopAtTools(names) => results
                .iter()
                .find(|(name, _)| names.iter().any(|n| n == name))
                .map(|(_, r)| r.output.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results() -> Vec<(String, ToolResult)> {
        vec![
            ("lookup".to_string(), ToolResult::success("found")),
            ("get_weather".to_string(), ToolResult::success(json!({"temp": 21}))),
        ]
    }

    #[test]
    fn test_run_llm_again_never_stops() {
        assert_eq!(ToolUseBehavior::RunLlmAgain.final_output(&results()), None);
    }

    #[test]
    fn test_stop_on_first_tool() {
        assert_eq!(
            ToolUseBehavior::StopOnFirstTool.final_output(&results()),
            Some(json!("found"))
        );
        assert_eq!(ToolUseBehavior::StopOnFirstTool.final_output(&[]), None);
    }

    #[test]
    fn test_stop_at_tools() {
        let behavior = ToolUseBehavior::StopAtTools(vec!["get_weather".into()]);
        assert_eq!(behavior.final_output(&results()), Some(json!({"temp": 21})));

        let other = ToolUseBehavior::StopAtTools(vec!["send_email".into()]);
        assert_eq!(other.final_output(&results()), None);
    }
}
