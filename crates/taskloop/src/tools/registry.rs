//! Tool registry for managing available tools

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Tool;

/// Registry of available tools, keyed by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// One line per tool: `- usage: description`
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.usage(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolContext, ToolResult};
    use anyhow::Result;
    use async_trait::async_trait;

    struct MockTool;

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "mock"
        }

        fn usage(&self) -> &str {
            "mock <arg>"
        }

        fn description(&self) -> &str {
            "A mock tool for testing"
        }

        async fn execute(&self, _args: &[String], _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success("mock output"))
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);

        assert_eq!(registry.list_names(), vec!["mock"]);
        assert!(registry.get("mock").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_registry_describe() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);

        assert_eq!(registry.describe(), "- mock <arg>: A mock tool for testing");
        assert_eq!(registry.list_names(), vec!["mock"]);
    }
}
