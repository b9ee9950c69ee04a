//! Instruction templates
//!
//! Templates are rendered with handlebars against a view of the request:
//! `context`, `metadata`, `agent`, `workflow`, `session` and `request`, plus
//! any variables declared next to the template (these win on conflicts).

use handlebars::Handlebars;
use serde_json::{json, Map, Value};

use super::types::{AgentDeclaration, InstructionDeclaration, InstructionTemplateDeclaration, WorkflowRequest};

/// Instructions of `agent` as plain text
pub fn render_instructions(request: &WorkflowRequest, agent: &AgentDeclaration) -> Result<String, String> {
    match &agent.instructions {
        InstructionDeclaration::None => Ok(String::new()),
        InstructionDeclaration::Text(text) => Ok(text.clone()),
        InstructionDeclaration::Template(template) => render_template(request, agent, template),
    }
}

fn render_template(
    request: &WorkflowRequest,
    agent: &AgentDeclaration,
    template: &InstructionTemplateDeclaration,
) -> Result<String, String> {
    let format = template.format.trim().to_lowercase();
    if !format.is_empty() && format != "handlebars" {
        return Err(format!("template format {:?} not supported", template.format));
    }

    let source = match &template.delimiters {
        Some([left, right]) if !left.is_empty() || !right.is_empty() => {
            rewrite_delimiters(&template.template, left, right)
        }
        _ => template.template.clone(),
    };

    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string("instructions", source)
        .map_err(|e| format!("parse template: {}", e))?;

    let data = template_data(request, agent, &template.variables);
    registry
        .render("instructions", &data)
        .map_err(|e| format!("execute template: {}", e))
}

/// Map custom delimiters onto `{{ }}`, escaping literal braces first
fn rewrite_delimiters(template: &str, left: &str, right: &str) -> String {
    let left = if left.is_empty() { "{{" } else { left };
    let right = if right.is_empty() { "}}" } else { right };
    if left == "{{" && right == "}}" {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(left) {
        out.push_str(&rest[..start].replace("{{", "\\{{"));
        let after = &rest[start + left.len()..];
        match after.find(right) {
            Some(end) => {
                out.push_str("{{");
                out.push_str(&after[..end]);
                out.push_str("}}");
                rest = &after[end + right.len()..];
            }
            None => {
                out.push_str(left);
                rest = after;
            }
        }
    }
    out.push_str(&rest.replace("{{", "\\{{"));
    out
}

fn template_data(request: &WorkflowRequest, agent: &AgentDeclaration, variables: &Map<String, Value>) -> Value {
    let workflow = &request.workflow;
    let session = &request.session;
    let handoff_names: Vec<&str> = agent
        .handoffs
        .iter()
        .map(|h| h.agent.as_str())
        .filter(|name| !name.is_empty())
        .collect();
    let agent_names: Vec<&str> = workflow.agents.iter().map(|a| a.name.as_str()).collect();

    let mut data = json!({
        "context": request.context,
        "metadata": request.metadata,
        "agent": {
            "name": agent.name,
            "display_name": agent.display_name,
            "annotations": agent.annotations,
            "handoff_names": handoff_names,
        },
        "workflow": {
            "name": workflow.name,
            "starting_agent": workflow.starting_agent,
            "metadata": workflow.metadata,
            "on_start": workflow.on_start,
            "on_finish": workflow.on_finish,
            "on_error": workflow.on_error,
            "agent_names": agent_names,
        },
        "session": {
            "id": session.session_id,
            "resume_token": session.resume_token,
            "persistent_store": session.persistent_store,
            "history_size": session.history_size,
            "max_turns": session.max_turns,
            "credentials": {
                "user_id": session.credentials.user_id,
                "account_id": session.credentials.account_id,
                "capabilities": session.credentials.capabilities,
                "metadata": session.credentials.metadata,
            },
        },
        "request": {
            "query": request.query,
            "inputs": request.inputs,
        },
    });
    if let Value::Object(root) = &mut data {
        for (key, value) in variables {
            root.insert(key.clone(), value.clone());
        }
    }
    data
}
