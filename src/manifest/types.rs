//! Declarative workflow manifest
//!
//! A `WorkflowRequest` is the JSON document a caller submits: the query, its
//! multimodal inputs, session limits, where events go, and the agent graph.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Latest supported manifest version
pub const CURRENT_WORKFLOW_VERSION: &str = "v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<WorkflowInput>,
    pub session: SessionDeclaration,
    #[serde(default)]
    pub callback: CallbackDeclaration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<CallbackDeclaration>,
    pub workflow: WorkflowDeclaration,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl WorkflowRequest {
    /// Parse a manifest from JSON text
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The single `callback` (when set) followed by `callbacks`
    pub fn all_callbacks(&self) -> Vec<&CallbackDeclaration> {
        let single = (!self.callback.is_empty()).then_some(&self.callback);
        single.into_iter().chain(self.callbacks.iter()).collect()
    }
}

/// Multimodal input accompanying the query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Literal payload: text, parts, JSON objects or base64 blobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDeclaration {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resume_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub persistent_store: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub store_config: Map<String, Value>,
    #[serde(default)]
    pub history_size: i64,
    #[serde(default)]
    pub max_turns: i64,
    #[serde(default)]
    pub credentials: CredentialDeclaration,
}

/// Identity data used for validation and logging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialDeclaration {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Where streaming events are published.
///
/// Accepts a bare URL string or an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallbackDeclaration {
    pub target: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<CallbackRetryPolicy>,
}

impl CallbackDeclaration {
    pub fn url(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn stdout() -> Self {
        Self {
            mode: "stdout".into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.target.trim().is_empty() && self.mode.trim().is_empty() && self.headers.is_empty() && self.retry.is_none()
    }

    /// Lower-cased, trimmed mode
    pub fn mode(&self) -> String {
        self.mode.trim().to_ascii_lowercase()
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self.mode().as_str(), "stdout" | "stdout_verbose")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CallbackRepr {
    Target(String),
    Object {
        #[serde(default)]
        target: String,
        #[serde(default)]
        mode: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        retry: Option<CallbackRetryPolicy>,
    },
}

impl<'de> Deserialize<'de> for CallbackDeclaration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match CallbackRepr::deserialize(deserializer)? {
            CallbackRepr::Target(target) => CallbackDeclaration::url(target),
            CallbackRepr::Object {
                target,
                mode,
                headers,
                retry,
            } => CallbackDeclaration {
                target,
                mode,
                headers,
                retry,
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackRetryPolicy {
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default, rename = "backoff_seconds")]
    pub backoff: f64,
}

/// The agent graph to execute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDeclaration {
    pub name: String,
    pub starting_agent: String,
    #[serde(default)]
    pub agents: Vec<AgentDeclaration>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_start: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_finish: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<String>,
}

impl WorkflowDeclaration {
    pub fn agent(&self, name: &str) -> Option<&AgentDeclaration> {
        self.agents.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "InstructionDeclaration::is_empty")]
    pub instructions: InstructionDeclaration,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelDeclaration>,
    #[serde(default, rename = "handoff", skip_serializing_if = "AgentHandoffDeclarations::is_empty")]
    pub handoffs: AgentHandoffDeclarations,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_tools: Vec<AgentToolReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(default, rename = "mcp", skip_serializing_if = "Vec::is_empty")]
    pub mcp_servers: Vec<McpDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_guardrails: Vec<GuardrailDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_guardrails: Vec<GuardrailDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<OutputTypeDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_behavior: Option<ToolUseBehaviorDeclaration>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub handoff_description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub annotations: Map<String, Value>,
}

impl AgentDeclaration {
    /// Display name, falling back to the agent name
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// Another agent exposed as a tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentToolReference {
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_extractor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_flow: Option<ToolApprovalFlowDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_ref: String,
}

impl ToolDeclaration {
    /// Trimmed string value of `config[key]`, empty when absent or not a string
    pub fn config_str(&self, key: &str) -> &str {
        config_str(&self.config, key)
    }

    /// Registered function name: `function_ref`, then `config.function_ref`, then `name`
    pub fn function_name(&self) -> &str {
        [self.function_ref.trim(), self.config_str("function_ref"), self.name.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }
}

pub(crate) fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> &'a str {
    config.get(key).and_then(Value::as_str).map(str::trim).unwrap_or_default()
}

/// Human approval expectations for a tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolApprovalFlowDeclaration {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub require: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resume_mode: String,
}

/// Hosted MCP server attached to an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpDeclaration {
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub server_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_label: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub require_approval: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTypeDeclaration {
    pub name: String,
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preset_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDeclaration {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningDeclaration>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verbosity: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_query: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_choice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub truncation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningDeclaration {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub effort: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBehaviorDeclaration {
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_names: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub handler: String,
}

// ============================================================================
// Instructions - plain text or a template object
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub enum InstructionDeclaration {
    #[default]
    None,
    Text(String),
    Template(InstructionTemplateDeclaration),
}

impl InstructionDeclaration {
    pub fn text(text: impl Into<String>) -> Self {
        InstructionDeclaration::Text(text.into())
    }

    pub fn template(template: impl Into<String>, variables: Map<String, Value>) -> Self {
        InstructionDeclaration::Template(InstructionTemplateDeclaration {
            template: template.into(),
            variables,
            ..Default::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            InstructionDeclaration::None => true,
            InstructionDeclaration::Text(text) => text.is_empty(),
            InstructionDeclaration::Template(_) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionTemplateDeclaration {
    pub template: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiters: Option<[String; 2]>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum InstructionRepr {
    Text(String),
    Template(InstructionTemplateDeclaration),
}

impl Serialize for InstructionDeclaration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InstructionDeclaration::None => serializer.serialize_str(""),
            InstructionDeclaration::Text(text) => serializer.serialize_str(text),
            InstructionDeclaration::Template(template) => template.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InstructionDeclaration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match InstructionRepr::deserialize(deserializer)? {
            InstructionRepr::Text(text) => InstructionDeclaration::Text(text),
            InstructionRepr::Template(template) => InstructionDeclaration::Template(template),
        })
    }
}

// ============================================================================
// Handoffs - list of names or objects
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHandoffDeclaration {
    pub agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input_filter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions_scope: String,
}

impl AgentHandoffDeclaration {
    pub fn to(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            ..Default::default()
        }
    }

    fn is_simple(&self) -> bool {
        !self.agent.is_empty()
            && self.input_filter.is_empty()
            && self.instructions.is_empty()
            && self.instructions_ref.is_empty()
            && self.instructions_scope.is_empty()
    }
}

/// Handoff targets; serialized as plain names when nothing else is set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentHandoffDeclarations(pub Vec<AgentHandoffDeclaration>);

impl AgentHandoffDeclarations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AgentHandoffDeclaration> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a AgentHandoffDeclarations {
    type Item = &'a AgentHandoffDeclaration;
    type IntoIter = std::slice::Iter<'a, AgentHandoffDeclaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HandoffRepr {
    Names(Vec<String>),
    Objects(Vec<AgentHandoffDeclaration>),
}

impl Serialize for AgentHandoffDeclarations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.iter().all(AgentHandoffDeclaration::is_simple) {
            let names: Vec<&str> = self.0.iter().map(|h| h.agent.as_str()).collect();
            names.serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AgentHandoffDeclarations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match HandoffRepr::deserialize(deserializer)? {
            HandoffRepr::Names(names) => {
                AgentHandoffDeclarations(names.into_iter().map(AgentHandoffDeclaration::to).collect())
            }
            HandoffRepr::Objects(objects) => AgentHandoffDeclarations(objects),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_callback_string_or_object() {
        let from_string: CallbackDeclaration = serde_json::from_value(json!("https://example.com/hook")).unwrap();
        assert_eq!(from_string.target, "https://example.com/hook");
        assert!(from_string.mode.is_empty());

        let from_object: CallbackDeclaration = serde_json::from_value(json!({
            "mode": "STDOUT",
            "retry": {"max_attempts": 3, "backoff_seconds": 0.5}
        }))
        .unwrap();
        assert!(from_object.is_stdout());
        assert_eq!(from_object.retry.unwrap().max_attempts, 3);
    }

    #[test]
    fn test_handoffs_round_trip() {
        let simple: AgentHandoffDeclarations = serde_json::from_value(json!(["billing", "refunds"])).unwrap();
        assert_eq!(simple.0[1].agent, "refunds");
        assert_eq!(serde_json::to_value(&simple).unwrap(), json!(["billing", "refunds"]));

        let filtered: AgentHandoffDeclarations =
            serde_json::from_value(json!([{"agent": "billing", "input_filter": "remove_all_tools"}])).unwrap();
        assert_eq!(
            serde_json::to_value(&filtered).unwrap(),
            json!([{"agent": "billing", "input_filter": "remove_all_tools"}])
        );
    }

    #[test]
    fn test_instructions_text_or_template() {
        let text: InstructionDeclaration = serde_json::from_value(json!("Be brief")).unwrap();
        assert_eq!(text, InstructionDeclaration::text("Be brief"));

        let template: InstructionDeclaration =
            serde_json::from_value(json!({"template": "Hi {{name}}", "variables": {"name": "Ada"}})).unwrap();
        match &template {
            InstructionDeclaration::Template(t) => assert_eq!(t.variables["name"], "Ada"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(serde_json::to_value(&template).unwrap()["template"], "Hi {{name}}");
    }

    #[test]
    fn test_minimal_manifest_parses() {
        let request = WorkflowRequest::from_json(
            r#"{
                "query": "hello",
                "session": {"session_id": "s1", "credentials": {"user_id": "u", "account_id": "a"}},
                "callback": {"mode": "stdout"},
                "workflow": {
                    "name": "demo",
                    "starting_agent": "greeter",
                    "agents": [{"name": "greeter", "instructions": "Say hi", "handoff": []}]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(request.all_callbacks().len(), 1);
        assert_eq!(request.workflow.agent("greeter").unwrap().label(), "greeter");
    }

    #[test]
    fn test_function_name_precedence() {
        let mut tool = ToolDeclaration {
            tool_type: "function".into(),
            name: "fallback".into(),
            ..Default::default()
        };
        assert_eq!(tool.function_name(), "fallback");

        tool.config.insert("function_ref".into(), json!("from_config"));
        assert_eq!(tool.function_name(), "from_config");

        tool.function_ref = "explicit".into();
        assert_eq!(tool.function_name(), "explicit");
    }
}
