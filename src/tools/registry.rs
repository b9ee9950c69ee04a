//! Named tool registry
//!
//! Manifests reference function tools by name. The registry holds the
//! implementations those names resolve to.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::tool::Tool;

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!("[ToolRegistry] Registering tool: {}", name);
        self.tools.insert(name, tool);
    }

    /// Register a tool, failing when the name is taken
    pub fn try_register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.tools.contains_key(tool.name()) {
            bail!("Tool name conflict: '{}' already exists", tool.name());
        }
        self.register(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use serde_json::json;

    fn tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(name, "", json!({}), |_ctx, _args| async {
            Ok::<_, anyhow::Error>("ok")
        }))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(tool("b_tool"));
        registry.register(tool("a_tool"));

        assert!(registry.contains("a_tool"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["a_tool", "b_tool"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_conflicting_names() {
        let mut registry = ToolRegistry::new();
        registry.try_register(tool("lookup")).unwrap();
        let err = registry.try_register(tool("lookup")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
