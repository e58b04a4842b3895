//! Built-in tools for the in-process gateway

mod exec;
mod flow;
mod fs;
mod http;
mod shell;
mod web_fetch;
mod web_search;

pub use exec::{AptInstallTool, PipInstallTool, RunPythonTool};
pub use flow::{ExitTool, FinishTool, StopTool, TimestampTool, WaitTool};
pub use fs::{AppendTool, EditTool, ListTool, MkdirTool, ReadTool, WriteTool};
pub use http::HttpTool;
pub use shell::ShellTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

use std::sync::OnceLock;
use std::time::Duration;

use super::registry::ToolRegistry;

/// Shared HTTP client for connection pooling
static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; taskloop/0.1)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Create a registry with every reserved tool
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Workspace files
    registry.register(ReadTool);
    registry.register(WriteTool);
    registry.register(AppendTool);
    registry.register(MkdirTool);
    registry.register(ListTool);
    registry.register(EditTool);

    // Network
    registry.register(WebSearchTool);
    registry.register(WebFetchTool);
    registry.register(HttpTool);

    // Execution
    registry.register(ShellTool::new("shell"));
    registry.register(ShellTool::new("run_shell"));
    registry.register(RunPythonTool);
    registry.register(PipInstallTool);
    registry.register(AptInstallTool);

    // Flow
    registry.register(WaitTool);
    registry.register(TimestampTool);
    registry.register(FinishTool);
    registry.register(StopTool);
    registry.register(ExitTool);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::gateway::RESERVED_TOOLS;

    #[test]
    fn test_default_registry_covers_reserved_names() {
        let registry = create_default_registry();
        for (usage, _) in RESERVED_TOOLS {
            let name = usage.split_whitespace().next().unwrap();
            assert!(registry.get(name).is_some(), "missing tool {}", name);
        }
        assert_eq!(registry.list_names().len(), RESERVED_TOOLS.len());
    }
}
