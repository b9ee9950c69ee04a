//! Structural validation of manifests
//!
//! Validation stops at the first problem and reports it with a path-like
//! prefix (`session invalid: ...`, `workflow invalid: agent "x" invalid: ...`).

use std::collections::HashSet;

use super::types::{
    config_str, AgentDeclaration, CallbackDeclaration, SessionDeclaration, WorkflowDeclaration, WorkflowInput,
    WorkflowRequest, CURRENT_WORKFLOW_VERSION,
};
use crate::core::{WorkflowError, WorkflowResult};

type Check = Result<(), String>;

/// Validate a request; the error describes the first issue found
pub fn validate_workflow_request(request: &WorkflowRequest) -> WorkflowResult<()> {
    check_request(request).map_err(WorkflowError::Validation)
}

fn check_request(request: &WorkflowRequest) -> Check {
    let version = request.version.trim();
    if !version.is_empty() && version != CURRENT_WORKFLOW_VERSION {
        return Err(format!("version {:?} not supported", request.version));
    }
    if request.query.trim().is_empty() {
        return Err("query is required".into());
    }
    check_inputs(&request.inputs).map_err(|e| format!("inputs invalid: {}", e))?;
    check_session(&request.session).map_err(|e| format!("session invalid: {}", e))?;

    let mut callbacks = 0;
    if !request.callback.is_empty() {
        check_callback(&request.callback).map_err(|e| format!("callback invalid: {}", e))?;
        callbacks += 1;
    }
    for (i, callback) in request.callbacks.iter().enumerate() {
        check_callback(callback).map_err(|e| format!("callbacks[{}] invalid: {}", i, e))?;
        callbacks += 1;
    }
    if callbacks == 0 {
        return Err("at least one callback is required".into());
    }

    check_workflow(&request.workflow).map_err(|e| format!("workflow invalid: {}", e))
}

fn check_inputs(inputs: &[WorkflowInput]) -> Check {
    for (i, input) in inputs.iter().enumerate() {
        if input.input_type.trim().is_empty() {
            return Err(format!("inputs[{}] missing type", i));
        }
        match input.input_type.to_ascii_lowercase().as_str() {
            "text" | "message" | "json" | "image" | "audio" | "video" => {}
            _ => return Err(format!("inputs[{}] type {:?} not supported", i, input.input_type)),
        }
        if input.uri.trim().is_empty() && input.content.is_none() {
            return Err(format!("inputs[{}] must provide either uri or content", i));
        }
    }
    Ok(())
}

fn check_session(session: &SessionDeclaration) -> Check {
    if session.session_id.is_empty() {
        return Err("session_id is required".into());
    }
    if session.credentials.user_id.is_empty() {
        return Err("credentials.user_id is required".into());
    }
    if session.credentials.account_id.is_empty() {
        return Err("credentials.account_id is required".into());
    }
    if session.history_size < 0 {
        return Err("history_size cannot be negative".into());
    }
    if session.max_turns < 0 {
        return Err("max_turns cannot be negative".into());
    }
    let store = session.persistent_store.trim();
    if !store.is_empty() && !matches!(store.to_ascii_lowercase().as_str(), "sqlite" | "postgres") {
        return Err(format!("persistent_store {:?} not supported", session.persistent_store));
    }
    Ok(())
}

/// Shallow check of one callback declaration
pub fn check_callback(callback: &CallbackDeclaration) -> Result<(), String> {
    if callback.is_stdout() {
        return Ok(());
    }
    if callback.target.trim().is_empty() {
        return Err("callback target is required".into());
    }
    reqwest::Url::parse(&callback.target)
        .map(|_| ())
        .map_err(|e| format!("callback target {:?} is not a valid URL: {}", callback.target, e))
}

fn check_workflow(workflow: &WorkflowDeclaration) -> Check {
    if workflow.name.is_empty() {
        return Err("name is required".into());
    }
    if workflow.starting_agent.is_empty() {
        return Err("starting_agent is required".into());
    }
    if workflow.agents.is_empty() {
        return Err("agents cannot be empty".into());
    }

    let mut seen = HashSet::with_capacity(workflow.agents.len());
    for (i, agent) in workflow.agents.iter().enumerate() {
        if agent.name.is_empty() {
            return Err(format!("agents[{}] missing name", i));
        }
        if !seen.insert(agent.name.as_str()) {
            return Err(format!("duplicate agent name {:?}", agent.name));
        }
        check_agent(agent).map_err(|e| format!("agent {:?} invalid: {}", agent.name, e))?;
    }

    for (field, hooks) in [
        ("on_start", &workflow.on_start),
        ("on_finish", &workflow.on_finish),
        ("on_error", &workflow.on_error),
    ] {
        if let Some(i) = hooks.iter().position(|h| h.trim().is_empty()) {
            return Err(format!("{}[{}] cannot be empty", field, i));
        }
    }

    if !seen.contains(workflow.starting_agent.as_str()) {
        return Err(format!("starting_agent {:?} not found in agents", workflow.starting_agent));
    }
    for agent in &workflow.agents {
        for handoff in &agent.handoffs {
            if handoff.agent.trim().is_empty() {
                return Err(format!("agent {:?} handoff missing agent", agent.name));
            }
            if !seen.contains(handoff.agent.as_str()) {
                return Err(format!("agent {:?} handoff {:?} not found", agent.name, handoff.agent));
            }
        }
        for tool in &agent.agent_tools {
            if !seen.contains(tool.agent_name.as_str()) {
                return Err(format!(
                    "agent {:?} agent_tool references unknown agent {:?}",
                    agent.name, tool.agent_name
                ));
            }
        }
    }
    Ok(())
}

fn check_agent(agent: &AgentDeclaration) -> Check {
    if let Some(model) = &agent.model {
        if model.model.is_empty() {
            return Err("model.model is required when model is present".into());
        }
    }

    for tool in &agent.tools {
        if tool.tool_type.trim().is_empty() {
            return Err("tool missing type".into());
        }
        let named = !tool.name.trim().is_empty();
        match tool.tool_type.to_ascii_lowercase().as_str() {
            "function" if tool.function_name().is_empty() => {
                return Err("function tool requires function_ref or name".into())
            }
            "computer" if !named && tool.config_str("provider").is_empty() => {
                return Err("computer tool requires config.provider or name".into())
            }
            "local_shell" if !named && config_str(&tool.config, "executor_ref").is_empty() => {
                return Err("local_shell tool requires config.executor_ref or name".into())
            }
            _ => {}
        }
    }

    for tool in &agent.tools {
        if let Some(flow) = &tool.approval_flow {
            if !matches!(flow.require.to_ascii_lowercase().as_str(), "" | "never" | "always" | "sensitive") {
                return Err(format!("tool approval_flow.require {:?} not supported", flow.require));
            }
            if !matches!(flow.resume_mode.to_ascii_lowercase().as_str(), "" | "auto" | "manual") {
                return Err(format!("tool approval_flow.resume_mode {:?} not supported", flow.resume_mode));
            }
        }
        if let Some(i) = tool.hooks.iter().position(|h| h.trim().is_empty()) {
            return Err(format!("tool hook[{}] cannot be empty", i));
        }
    }

    if agent.mcp_servers.iter().any(|mcp| mcp.address.trim().is_empty()) {
        return Err("mcp address is required".into());
    }

    for guardrail in agent.input_guardrails.iter().chain(&agent.output_guardrails) {
        if guardrail.name.trim().is_empty() {
            return Err("guardrail missing name".into());
        }
        if !matches!(guardrail.mode.to_ascii_lowercase().as_str(), "" | "blocking" | "monitor") {
            return Err(format!("guardrail {:?} mode {:?} not supported", guardrail.name, guardrail.mode));
        }
    }

    if let Some(i) = agent.hooks.iter().position(|h| h.trim().is_empty()) {
        return Err(format!("agent hook[{}] cannot be empty", i));
    }

    if let Some(behavior) = &agent.tool_use_behavior {
        match behavior.mode.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "run_llm_again" | "stop_on_first_tool" => {}
            "stop_at_tools" if behavior.tool_names.is_empty() => {
                return Err("tool_use_behavior.stop_at_tools requires tool_names".into())
            }
            "stop_at_tools" => {}
            "custom" if behavior.handler.trim().is_empty() => {
                return Err("tool_use_behavior.custom requires handler".into())
            }
            "custom" => {}
            _ => return Err(format!("tool_use_behavior mode {:?} not supported", behavior.mode)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::types::{
        AgentHandoffDeclaration, AgentHandoffDeclarations, CredentialDeclaration, GuardrailDeclaration,
        ToolDeclaration, ToolUseBehaviorDeclaration,
    };
    use serde_json::json;

    fn valid_request() -> WorkflowRequest {
        WorkflowRequest {
            query: "hello".into(),
            session: SessionDeclaration {
                session_id: "s1".into(),
                credentials: CredentialDeclaration {
                    user_id: "u1".into(),
                    account_id: "a1".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
            callback: CallbackDeclaration::stdout(),
            workflow: WorkflowDeclaration {
                name: "demo".into(),
                starting_agent: "triage".into(),
                agents: vec![
                    AgentDeclaration {
                        name: "triage".into(),
                        handoffs: AgentHandoffDeclarations(vec![AgentHandoffDeclaration::to("billing")]),
                        ..Default::default()
                    },
                    AgentDeclaration {
                        name: "billing".into(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn message(request: &WorkflowRequest) -> String {
        validate_workflow_request(request).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_request() {
        validate_workflow_request(&valid_request()).unwrap();
    }

    #[test]
    fn test_version_and_query() {
        let mut request = valid_request();
        request.version = "v2".into();
        assert_eq!(message(&request), r#"version "v2" not supported"#);

        let mut request = valid_request();
        request.query = "   ".into();
        assert_eq!(message(&request), "query is required");
    }

    #[test]
    fn test_inputs() {
        let mut request = valid_request();
        request.inputs = vec![WorkflowInput {
            input_type: "text".into(),
            ..Default::default()
        }];
        assert_eq!(message(&request), "inputs invalid: inputs[0] must provide either uri or content");

        request.inputs[0].input_type = "hologram".into();
        request.inputs[0].content = Some(json!("x"));
        assert_eq!(message(&request), r#"inputs invalid: inputs[0] type "hologram" not supported"#);
    }

    #[test]
    fn test_session_rules() {
        let mut request = valid_request();
        request.session.credentials.account_id.clear();
        assert_eq!(message(&request), "session invalid: credentials.account_id is required");

        let mut request = valid_request();
        request.session.persistent_store = "redis".into();
        assert_eq!(message(&request), r#"session invalid: persistent_store "redis" not supported"#);

        let mut request = valid_request();
        request.session.max_turns = -1;
        assert_eq!(message(&request), "session invalid: max_turns cannot be negative");
    }

    #[test]
    fn test_callbacks() {
        let mut request = valid_request();
        request.callback = CallbackDeclaration::default();
        assert_eq!(message(&request), "at least one callback is required");

        request.callbacks = vec![CallbackDeclaration::url("not a url")];
        assert!(message(&request).starts_with(r#"callbacks[0] invalid: callback target "not a url" is not a valid URL"#));

        request.callbacks = vec![CallbackDeclaration::url("https://hooks.example.com/run")];
        validate_workflow_request(&request).unwrap();
    }

    #[test]
    fn test_graph_references() {
        let mut request = valid_request();
        request.workflow.starting_agent = "ghost".into();
        assert_eq!(message(&request), r#"workflow invalid: starting_agent "ghost" not found in agents"#);

        let mut request = valid_request();
        request.workflow.agents[1].name = "triage".into();
        assert_eq!(message(&request), r#"workflow invalid: duplicate agent name "triage""#);

        let mut request = valid_request();
        request.workflow.agents.pop();
        assert_eq!(message(&request), r#"workflow invalid: agent "triage" handoff "billing" not found"#);
    }

    #[test]
    fn test_agent_rules() {
        let mut request = valid_request();
        request.workflow.agents[1].tools = vec![ToolDeclaration {
            tool_type: "function".into(),
            ..Default::default()
        }];
        assert_eq!(
            message(&request),
            r#"workflow invalid: agent "billing" invalid: function tool requires function_ref or name"#
        );

        let mut request = valid_request();
        request.workflow.agents[1].output_guardrails = vec![GuardrailDeclaration {
            name: "pii".into(),
            mode: "strict".into(),
            ..Default::default()
        }];
        assert_eq!(
            message(&request),
            r#"workflow invalid: agent "billing" invalid: guardrail "pii" mode "strict" not supported"#
        );

        let mut request = valid_request();
        request.workflow.agents[1].tool_use_behavior = Some(ToolUseBehaviorDeclaration {
            mode: "stop_at_tools".into(),
            ..Default::default()
        });
        assert_eq!(
            message(&request),
            r#"workflow invalid: agent "billing" invalid: tool_use_behavior.stop_at_tools requires tool_names"#
        );
    }

    #[test]
    fn test_empty_hook_names() {
        let mut request = valid_request();
        request.workflow.on_finish = vec!["audit".into(), " ".into()];
        assert_eq!(message(&request), "workflow invalid: on_finish[1] cannot be empty");
    }
}
