//! Demo resources for the `run-manifest` binary
//!
//! Registers:
//! - `get_weather` - canned weather report function tool
//! - `mock_sensitive_files` - function tool and hosted MCP server that ask
//!   for approval before revealing file names
//! - `sensitive_data_check` - output guardrail tripping on phone numbers
//!
//! `WORKFLOWRUNNER_MOCK_APPROVAL=auto_approve` skips the terminal prompts.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::RunContext;
use crate::guardrail::{GuardrailFunctionOutput, OutputGuardrail};
use crate::items::McpApprovalRequest;
use crate::manifest::{hosted_mcp_from_declaration, Builder, GuardrailDeclaration, ToolDeclaration, ToolFactoryEnv};
use crate::tools::{FunctionTool, McpApprovalDecision, McpApprovalHandler, Tool, ToolResult};

pub const MOCK_APPROVAL_ENV: &str = "WORKFLOWRUNNER_MOCK_APPROVAL";

const PHONE_NUMBER: &str = r"(?:\+?\d{1,3}[-.\s]?)?(?:\(\d{3}\)|\b\d{3})[-.\s]?\d{3}[-.\s]?\d{4}\b";

/// Register every demo resource on `builder`
pub fn register_demo_resources(builder: Builder) -> Builder {
    builder
        .with_function_tool("get_weather", Arc::new(weather_tool))
        .with_function_tool("mock_sensitive_files", Arc::new(sensitive_files_tool))
        .with_hosted_mcp_tool("mock_sensitive_files", Arc::new(sensitive_files_mcp))
        .with_output_guardrail("sensitive_data_check", Arc::new(sensitive_data_guardrail))
}

fn auto_approve() -> bool {
    std::env::var(MOCK_APPROVAL_ENV)
        .map(|v| v.trim().eq_ignore_ascii_case("auto_approve"))
        .unwrap_or(false)
}

/// Ask on the terminal; anything but `y`/`yes` declines
async fn prompt_yes_no(prompt: String) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await??;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn description(decl: &ToolDeclaration, default: &str) -> String {
    match decl.config_str("description") {
        "" => default.to_string(),
        custom => custom.to_string(),
    }
}

// ============================================================================
// get_weather
// ============================================================================

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    city: String,
}

fn weather_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    let tool = FunctionTool::new(
        "get_weather",
        description(decl, "Get the current weather information for a specified city."),
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"],
            "additionalProperties": false
        }),
        |_ctx, args: Value| async move {
            let args: WeatherArgs = match serde_json::from_value(args) {
                Ok(args) => args,
                Err(e) => return Ok(ToolResult::error(format!("invalid arguments: {}", e))),
            };
            Ok::<_, anyhow::Error>(ToolResult::success(json!({
                "city": args.city,
                "temperature_range": "14-20C",
                "conditions": "Sunny with wind.",
            })))
        },
    )
    .with_strict(true);
    Ok(Arc::new(tool))
}

// ============================================================================
// mock_sensitive_files
// ============================================================================

const DEFAULT_FILES: [&str; 3] = ["vault/secret_plans.txt", "logs/access.log", "notes/secret_thoughts.md"];

#[derive(Debug, Default, Deserialize)]
struct SensitiveFilesArgs {
    #[serde(default)]
    pattern: String,
}

fn filter_matches(files: &[String], pattern: &str) -> Vec<String> {
    let pattern = pattern.to_lowercase();
    files
        .iter()
        .filter(|file| file.to_lowercase().contains(&pattern))
        .cloned()
        .collect()
}

fn sensitive_files_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    let configured: Vec<String> = decl
        .config
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(Value::as_str)
                .filter(|f| !f.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let files = Arc::new(if configured.is_empty() {
        DEFAULT_FILES.iter().map(|f| f.to_string()).collect()
    } else {
        configured
    });
    let default_pattern = match decl.config_str("default_pattern") {
        "" => "secret".to_string(),
        pattern => pattern.to_string(),
    };

    let tool = FunctionTool::new(
        "mock_sensitive_files",
        description(decl, "Scan for sensitive files. Requires user approval before revealing matches."),
        json!({
            "type": "object",
            "properties": {"pattern": {"type": "string"}},
            "additionalProperties": false
        }),
        move |_ctx, args: Value| {
            let files = files.clone();
            let default_pattern = default_pattern.clone();
            async move {
                let args: SensitiveFilesArgs = serde_json::from_value(args).unwrap_or_default();
                let pattern = match args.pattern.trim() {
                    "" => default_pattern,
                    pattern => pattern.to_string(),
                };
                let matches = filter_matches(&files, &pattern);
                if matches.is_empty() || auto_approve() {
                    return Ok::<_, anyhow::Error>(ToolResult::success(json!({"approved": true, "matches": matches})));
                }
                let prompt = format!(
                    "\nApproval required to reveal files: {}\nApprove? [y/N]: ",
                    matches.join(", ")
                );
                if prompt_yes_no(prompt).await.unwrap_or(false) {
                    Ok(ToolResult::success(json!({"approved": true, "matches": matches})))
                } else {
                    Ok(ToolResult::error("access denied by user"))
                }
            }
        },
    );
    Ok(Arc::new(tool))
}

/// Approves on the terminal, or automatically when configured to
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalApproval {
    pub auto_approve: bool,
}

impl TerminalApproval {
    /// Reads the auto-approve setting from the environment
    pub fn from_env() -> Self {
        Self {
            auto_approve: auto_approve(),
        }
    }
}

#[async_trait]
impl McpApprovalHandler for TerminalApproval {
    async fn on_approval_request(&self, _ctx: &RunContext, request: &McpApprovalRequest) -> Result<McpApprovalDecision> {
        if self.auto_approve {
            return Ok(McpApprovalDecision::approve());
        }
        let prompt = format!(
            "\nApproval required for tool {} ({})\nArguments: {}\nApprove? [y/N]: ",
            request.name, request.server_label, request.arguments
        );
        if prompt_yes_no(prompt).await? {
            Ok(McpApprovalDecision::approve())
        } else {
            Ok(McpApprovalDecision::reject("User declined"))
        }
    }
}

fn sensitive_files_mcp(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    let mut decl = decl.clone();
    if decl.name.trim().is_empty() && decl.config_str("server_label").is_empty() {
        decl.name = "mock_sensitive_files".into();
    }
    let mut tool = hosted_mcp_from_declaration(&decl, "mock://sensitive-files")?;
    if decl.approval_flow.as_ref().map_or(true, |f| f.require.trim().is_empty())
        && decl.config_str("require_approval").is_empty()
    {
        tool = tool.with_require_approval("always");
    }
    Ok(Arc::new(tool.with_approval_handler(Arc::new(TerminalApproval::from_env()))))
}

// ============================================================================
// sensitive_data_check
// ============================================================================

/// Text of `field` in a final output; plain strings count as `response`
fn string_field(output: &Value, field: &str) -> String {
    match output {
        Value::Object(map) => match map.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        Value::Array(items) => items.iter().map(|item| string_field(item, field)).collect(),
        Value::String(s) if field == "response" => s.clone(),
        _ => String::new(),
    }
}

fn check_sensitive_data(phone: &Regex, output: &Value) -> GuardrailFunctionOutput {
    let reasoning = phone.is_match(&string_field(output, "reasoning"));
    let response = phone.is_match(&string_field(output, "response"));
    let info = json!({
        "reasoning_contains_phone": reasoning,
        "response_contains_phone": response,
    });
    if reasoning || response {
        GuardrailFunctionOutput::trip(info)
    } else {
        GuardrailFunctionOutput::pass(info)
    }
}

fn sensitive_data_guardrail(_decl: &GuardrailDeclaration) -> Result<OutputGuardrail> {
    let phone = Arc::new(Regex::new(PHONE_NUMBER)?);
    Ok(OutputGuardrail::from_fn("sensitive_data_check", move |_ctx, _agent, output| {
        let phone = phone.clone();
        async move { Ok(check_sensitive_data(&phone, &output)) }
    }))
}
