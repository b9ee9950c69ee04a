//! Closure-backed function tools

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use super::tool::{Tool, ToolContext, ToolKind, ToolResult};
use crate::llm::ToolDefinition;

type Handler = Arc<dyn Fn(ToolContext, Value) -> BoxFuture<'static, Result<ToolResult>> + Send + Sync>;

/// Tool whose body is an async closure over parsed JSON arguments
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    strict: bool,
    handler: Handler,
}

impl FunctionTool {
    /// Create a function tool.
    ///
    /// `parameters` is the JSON schema of the arguments object. The handler
    /// may return anything convertible into a `ToolResult` (a `Value`, a
    /// `String`, or a `ToolResult` built with `ToolResult::error`).
    pub fn new<F, Fut, T>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Into<ToolResult> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: false,
            handler: Arc::new(move |ctx: ToolContext, args: Value| -> BoxFuture<'static, Result<ToolResult>> {
                let fut = handler(ctx, args);
                Box::pin(async move { fut.await.map(Into::into) })
            }),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("strict", &self.strict)
            .finish()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Function
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::Function {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            strict: self.strict,
        }
    }

    async fn invoke(&self, ctx: &ToolContext, arguments: &str) -> Result<ToolResult> {
        let args = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(tool = %self.name, error = %e, "[FunctionTool] Invalid JSON arguments");
                    return Ok(ToolResult::error(format!(
                        "Invalid JSON input for tool {}: {}",
                        self.name, e
                    )));
                }
            }
        };

        tracing::debug!(tool = %self.name, call_id = %ctx.call_id, "[FunctionTool] Invoking");
        (self.handler)(ctx.clone(), args).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::RunContext;
    use crate::llm::{EchoModel, StaticModelProvider};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    pub(crate) fn test_context() -> ToolContext {
        ToolContext {
            run: RunContext::default(),
            model_provider: Arc::new(StaticModelProvider::new(Arc::new(EchoModel::new()))),
            agent_name: "tester".into(),
            call_id: "call_1".into(),
            cancel: CancellationToken::new(),
        }
    }

    fn weather_tool() -> FunctionTool {
        FunctionTool::new(
            "get_weather",
            "Weather lookup",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            |_ctx, args: Value| async move {
                let city = args["city"].as_str().unwrap_or("nowhere").to_string();
                Ok(format!("Sunny in {}", city))
            },
        )
    }

    #[tokio::test]
    async fn test_invoke_with_arguments() {
        let tool = weather_tool();
        let result = tool
            .invoke(&test_context(), r#"{"city": "Paris"}"#)
            .await
            .unwrap();
        assert_eq!(result.output_text(), "Sunny in Paris");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_empty_arguments_are_an_empty_object() {
        let tool = weather_tool();
        let result = tool.invoke(&test_context(), "").await.unwrap();
        assert_eq!(result.output_text(), "Sunny in nowhere");
    }

    #[tokio::test]
    async fn test_invalid_json_goes_back_to_model() {
        let tool = weather_tool();
        let result = tool.invoke(&test_context(), "{not json").await.unwrap();
        assert!(result.is_error);
        assert!(result.output_text().starts_with("Invalid JSON input for tool get_weather"));
    }

    #[tokio::test]
    async fn test_handler_error_is_fatal() {
        let tool = FunctionTool::new("broken", "", json!({}), |_ctx, _args| async {
            Err::<Value, _>(anyhow::anyhow!("backend down"))
        });
        let err = tool.invoke(&test_context(), "{}").await.unwrap_err();
        assert_eq!(err.to_string(), "backend down");
    }

    #[test]
    fn test_definition() {
        let def = weather_tool().with_strict(true).definition();
        match def {
            ToolDefinition::Function { name, strict, .. } => {
                assert_eq!(name, "get_weather");
                assert!(strict);
            }
            other => panic!("unexpected definition {:?}", other),
        }
    }
}
