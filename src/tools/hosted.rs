//! Hosted tools
//!
//! These tools run on the model provider's side. The runner only sends their
//! definitions and records the calls the model reports back. Hosted MCP tools
//! may additionally carry an approval handler that answers approval requests
//! locally.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::tool::{Tool, ToolContext, ToolKind, ToolResult};
use crate::core::RunContext;
use crate::items::McpApprovalRequest;
use crate::llm::ToolDefinition;

/// Web search, file search, code interpreter or image generation
#[derive(Debug, Clone)]
pub struct HostedTool {
    kind: ToolKind,
    description: String,
    definition: ToolDefinition,
}

impl HostedTool {
    pub fn web_search(user_location: Option<Value>, search_context_size: Option<String>) -> Self {
        Self {
            kind: ToolKind::WebSearch,
            description: "Search the web".to_string(),
            definition: ToolDefinition::WebSearch {
                user_location,
                search_context_size,
            },
        }
    }

    pub fn file_search(
        vector_store_ids: Vec<String>,
        max_num_results: Option<u64>,
        include_search_results: bool,
    ) -> Self {
        Self {
            kind: ToolKind::FileSearch,
            description: "Search uploaded files".to_string(),
            definition: ToolDefinition::FileSearch {
                vector_store_ids,
                max_num_results,
                include_search_results,
            },
        }
    }

    pub fn code_interpreter(container: Value) -> Self {
        Self {
            kind: ToolKind::CodeInterpreter,
            description: "Run code in a sandboxed container".to_string(),
            definition: ToolDefinition::CodeInterpreter { container },
        }
    }

    pub fn image_generation(config: Value) -> Self {
        Self {
            kind: ToolKind::ImageGeneration,
            description: "Generate images".to_string(),
            definition: ToolDefinition::ImageGeneration { config },
        }
    }
}

#[async_trait]
impl Tool for HostedTool {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn invoke(&self, _ctx: &ToolContext, _arguments: &str) -> Result<ToolResult> {
        anyhow::bail!("{} is a hosted tool and runs on the model side", self.kind)
    }
}

// ============================================================================
// Hosted MCP
// ============================================================================

/// Answer to an MCP approval request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpApprovalDecision {
    pub approve: bool,
    pub reason: Option<String>,
}

impl McpApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approve: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approve: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides MCP approval requests raised by the model
#[async_trait]
pub trait McpApprovalHandler: Send + Sync {
    async fn on_approval_request(
        &self,
        ctx: &RunContext,
        request: &McpApprovalRequest,
    ) -> Result<McpApprovalDecision>;
}

#[async_trait]
impl<F> McpApprovalHandler for F
where
    F: Fn(&McpApprovalRequest) -> Result<McpApprovalDecision> + Send + Sync,
{
    async fn on_approval_request(
        &self,
        _ctx: &RunContext,
        request: &McpApprovalRequest,
    ) -> Result<McpApprovalDecision> {
        (self)(request)
    }
}

/// Remote MCP server exposed to the model as a hosted tool
#[derive(Clone)]
pub struct HostedMcpTool {
    pub server_label: String,
    pub server_url: String,
    /// `never`, `always` or `sensitive`
    pub require_approval: String,
    pub headers: HashMap<String, String>,
    pub allowed_tools: Option<Vec<String>>,
    on_approval: Option<Arc<dyn McpApprovalHandler>>,
}

impl HostedMcpTool {
    pub fn new(server_label: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            server_label: server_label.into(),
            server_url: server_url.into(),
            require_approval: "never".to_string(),
            headers: HashMap::new(),
            allowed_tools: None,
            on_approval: None,
        }
    }

    pub fn with_require_approval(mut self, require: impl Into<String>) -> Self {
        self.require_approval = require.into();
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn with_approval_handler(mut self, handler: Arc<dyn McpApprovalHandler>) -> Self {
        self.on_approval = Some(handler);
        self
    }

    pub fn approval_handler(&self) -> Option<&Arc<dyn McpApprovalHandler>> {
        self.on_approval.as_ref()
    }
}

impl std::fmt::Debug for HostedMcpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedMcpTool")
            .field("server_label", &self.server_label)
            .field("server_url", &self.server_url)
            .field("require_approval", &self.require_approval)
            .field("has_approval_handler", &self.on_approval.is_some())
            .finish()
    }
}

#[async_trait]
impl Tool for HostedMcpTool {
    fn name(&self) -> &str {
        &self.server_label
    }

    fn description(&self) -> &str {
        &self.server_url
    }

    fn kind(&self) -> ToolKind {
        ToolKind::HostedMcp
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::Mcp {
            server_label: self.server_label.clone(),
            server_url: self.server_url.clone(),
            require_approval: self.require_approval.clone(),
            headers: self.headers.clone(),
            allowed_tools: self.allowed_tools.clone(),
        }
    }

    async fn invoke(&self, _ctx: &ToolContext, _arguments: &str) -> Result<ToolResult> {
        anyhow::bail!("MCP server {} is called by the model, not the runner", self.server_label)
    }

    fn as_hosted_mcp(&self) -> Option<&HostedMcpTool> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::function::tests::test_context;

    fn request(name: &str) -> McpApprovalRequest {
        McpApprovalRequest {
            id: "apr_1".into(),
            server_label: "files".into(),
            name: name.into(),
            arguments: "{}".into(),
        }
    }

    #[tokio::test]
    async fn test_closure_approval_handler() {
        let handler: Arc<dyn McpApprovalHandler> = Arc::new(|req: &McpApprovalRequest| -> Result<McpApprovalDecision> {
            if req.name == "list_files" {
                Ok(McpApprovalDecision::approve())
            } else {
                Ok(McpApprovalDecision::reject("not allowed"))
            }
        });
        let tool = HostedMcpTool::new("files", "https://mcp.example.com")
            .with_require_approval("always")
            .with_approval_handler(handler);

        let handler = tool.as_hosted_mcp().and_then(|t| t.approval_handler()).unwrap();
        let ctx = RunContext::default();
        assert!(handler.on_approval_request(&ctx, &request("list_files")).await.unwrap().approve);

        let decision = handler.on_approval_request(&ctx, &request("delete")).await.unwrap();
        assert!(!decision.approve);
        assert_eq!(decision.reason.as_deref(), Some("not allowed"));
    }

    #[tokio::test]
    async fn test_hosted_tools_are_not_invoked_locally() {
        let tool = HostedTool::web_search(None, Some("low".into()));
        assert_eq!(tool.name(), "web_search");
        assert!(tool.invoke(&test_context(), "{}").await.is_err());
    }

    #[test]
    fn test_mcp_definition() {
        let tool = HostedMcpTool::new("files", "https://mcp.example.com").with_allowed_tools(vec!["list".into()]);
        match tool.definition() {
            ToolDefinition::Mcp {
                server_label,
                require_approval,
                allowed_tools,
                ..
            } => {
                assert_eq!(server_label, "files");
                assert_eq!(require_approval, "never");
                assert_eq!(allowed_tools, Some(vec!["list".to_string()]));
            }
            other => panic!("unexpected definition {:?}", other),
        }
    }
}
