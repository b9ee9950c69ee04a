//! Input and output guardrails
//!
//! A guardrail wraps an async check function. Input guardrails see the
//! run's original input on the first turn; output guardrails see the final
//! output. A triggered tripwire ends the run unless the guardrail runs in
//! `Monitor` mode, where the verdict is only recorded.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agent::Agent;
use crate::core::RunContext;
use crate::items::InputItem;

/// How a triggered tripwire is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailMode {
    /// A tripwire ends the run
    #[default]
    Blocking,
    /// A tripwire is recorded under `would_trip` and the run continues
    Monitor,
}

impl GuardrailMode {
    /// Parse a manifest mode; empty means blocking
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "blocking" => Some(GuardrailMode::Blocking),
            "monitor" => Some(GuardrailMode::Monitor),
            _ => None,
        }
    }

    fn apply(self, output: GuardrailFunctionOutput) -> GuardrailFunctionOutput {
        match self {
            GuardrailMode::Blocking => output,
            GuardrailMode::Monitor if !output.tripwire_triggered => output,
            GuardrailMode::Monitor => GuardrailFunctionOutput {
                output_info: json!({
                    "mode": "monitor",
                    "would_trip": true,
                    "info": output.output_info,
                }),
                tripwire_triggered: false,
            },
        }
    }
}

/// Verdict of a guardrail check function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailFunctionOutput {
    /// Free-form information about the check
    pub output_info: Value,
    pub tripwire_triggered: bool,
}

impl GuardrailFunctionOutput {
    pub fn pass(output_info: Value) -> Self {
        Self {
            output_info,
            tripwire_triggered: false,
        }
    }

    pub fn trip(output_info: Value) -> Self {
        Self {
            output_info,
            tripwire_triggered: true,
        }
    }
}

type InputCheck =
    Arc<dyn Fn(RunContext, Arc<Agent>, Vec<InputItem>) -> BoxFuture<'static, Result<GuardrailFunctionOutput>> + Send + Sync>;

type OutputCheck =
    Arc<dyn Fn(RunContext, Arc<Agent>, Value) -> BoxFuture<'static, Result<GuardrailFunctionOutput>> + Send + Sync>;

// ============================================================================
// Input guardrails
// ============================================================================

/// Check that runs against the input of the first turn
#[derive(Clone)]
pub struct InputGuardrail {
    pub name: String,
    pub mode: GuardrailMode,
    check: InputCheck,
}

impl InputGuardrail {
    pub fn from_fn<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>, Vec<InputItem>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailFunctionOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            mode: GuardrailMode::Blocking,
            check: Arc::new(
                move |ctx: RunContext, agent: Arc<Agent>, input: Vec<InputItem>| -> BoxFuture<'static, Result<GuardrailFunctionOutput>> {
                    Box::pin(check(ctx, agent, input))
                },
            ),
        }
    }

    pub fn with_mode(mut self, mode: GuardrailMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn run(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        input: &[InputItem],
    ) -> Result<InputGuardrailResult> {
        let output = (self.check)(ctx.clone(), agent.clone(), input.to_vec()).await?;
        let output = self.mode.apply(output);
        tracing::debug!(
            guardrail = %self.name,
            tripwire = output.tripwire_triggered,
            "[Guardrail] Input check finished"
        );
        Ok(InputGuardrailResult {
            guardrail_name: self.name.clone(),
            agent_name: agent.name.clone(),
            output,
        })
    }
}

impl fmt::Debug for InputGuardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputGuardrail")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputGuardrailResult {
    pub guardrail_name: String,
    pub agent_name: String,
    pub output: GuardrailFunctionOutput,
}

impl InputGuardrailResult {
    pub fn tripwire_triggered(&self) -> bool {
        self.output.tripwire_triggered
    }
}

// ============================================================================
// Output guardrails
// ============================================================================

/// Check that runs against a run's final output
#[derive(Clone)]
pub struct OutputGuardrail {
    pub name: String,
    pub mode: GuardrailMode,
    check: OutputCheck,
}

impl OutputGuardrail {
    pub fn from_fn<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailFunctionOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            mode: GuardrailMode::Blocking,
            check: Arc::new(
                move |ctx: RunContext, agent: Arc<Agent>, output: Value| -> BoxFuture<'static, Result<GuardrailFunctionOutput>> {
                    Box::pin(check(ctx, agent, output))
                },
            ),
        }
    }

    pub fn with_mode(mut self, mode: GuardrailMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn run(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        agent_output: &Value,
    ) -> Result<OutputGuardrailResult> {
        let output = (self.check)(ctx.clone(), agent.clone(), agent_output.clone()).await?;
        let output = self.mode.apply(output);
        tracing::debug!(
            guardrail = %self.name,
            tripwire = output.tripwire_triggered,
            "[Guardrail] Output check finished"
        );
        Ok(OutputGuardrailResult {
            guardrail_name: self.name.clone(),
            agent_name: agent.name.clone(),
            agent_output: agent_output.clone(),
            output,
        })
    }
}

impl fmt::Debug for OutputGuardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputGuardrail")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputGuardrailResult {
    pub guardrail_name: String,
    pub agent_name: String,
    /// The final output the guardrail inspected
    pub agent_output: Value,
    pub output: GuardrailFunctionOutput,
}

impl OutputGuardrailResult {
    pub fn tripwire_triggered(&self) -> bool {
        self.output.tripwire_triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_trip() -> InputGuardrail {
        InputGuardrail::from_fn("always_trip", |_ctx, _agent, _input| async {
            Ok(GuardrailFunctionOutput::trip(json!({"reason": "blocked"})))
        })
    }

    #[tokio::test]
    async fn test_blocking_guardrail_trips() {
        let agent = Arc::new(Agent::new("triage"));
        let result = always_trip()
            .run(&RunContext::default(), &agent, &[InputItem::user("hi")])
            .await
            .unwrap();

        assert!(result.tripwire_triggered());
        assert_eq!(result.guardrail_name, "always_trip");
        assert_eq!(result.agent_name, "triage");
    }

    #[tokio::test]
    async fn test_monitor_guardrail_records_would_trip() {
        let agent = Arc::new(Agent::new("triage"));
        let result = always_trip()
            .with_mode(GuardrailMode::Monitor)
            .run(&RunContext::default(), &agent, &[])
            .await
            .unwrap();

        assert!(!result.tripwire_triggered());
        assert_eq!(result.output.output_info["would_trip"], true);
        assert_eq!(result.output.output_info["info"]["reason"], "blocked");
    }

    #[tokio::test]
    async fn test_output_guardrail_sees_output() {
        let guardrail = OutputGuardrail::from_fn("no_secrets", |_ctx, _agent, output: Value| async move {
            let text = output.as_str().unwrap_or_default().to_string();
            if text.contains("secret") {
                Ok(GuardrailFunctionOutput::trip(json!({"matched": "secret"})))
            } else {
                Ok(GuardrailFunctionOutput::pass(Value::Null))
            }
        });
        let agent = Arc::new(Agent::new("writer"));

        let clean = guardrail
            .run(&RunContext::default(), &agent, &json!("all good"))
            .await
            .unwrap();
        assert!(!clean.tripwire_triggered());

        let leaked = guardrail
            .run(&RunContext::default(), &agent, &json!("the secret is 42"))
            .await
            .unwrap();
        assert!(leaked.tripwire_triggered());
        assert_eq!(leaked.agent_output, json!("the secret is 42"));
    }

    #[tokio::test]
    async fn test_check_error_propagates() {
        let guardrail = InputGuardrail::from_fn("broken", |_ctx, _agent, _input| async {
            Err::<GuardrailFunctionOutput, _>(anyhow::anyhow!("classifier unavailable"))
        });
        let agent = Arc::new(Agent::new("triage"));
        let err = guardrail
            .run(&RunContext::default(), &agent, &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "classifier unavailable");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(GuardrailMode::parse(""), Some(GuardrailMode::Blocking));
        assert_eq!(GuardrailMode::parse("Monitor"), Some(GuardrailMode::Monitor));
        assert_eq!(GuardrailMode::parse("audit"), None);
    }
}
