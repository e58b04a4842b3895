//! Tool framework for the agent's tool gateway
//!
//! Tools take ordered string arguments and always answer with text; failures
//! are reported through [`ToolResult`] rather than raised.

pub mod builtin;
pub mod gateway;
pub mod registry;
pub mod security;
pub mod workspace;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gateway::{BuiltinGateway, GatewayOutput, ProcessGateway, ToolGateway};
pub use workspace::Workspace;

/// Exit status of a successful call
pub const STATUS_OK: i32 = 0;
/// Exit status of a generic tool error
pub const STATUS_ERROR: i32 = 1;
/// Exit status of the `stop` signal
pub const STATUS_STOP: i32 = 10;
/// Exit status of the `exit` signal
pub const STATUS_EXIT: i32 = 11;
/// Exit status reported when a call exceeds its timeout
pub const STATUS_TIMEOUT: i32 = 124;

/// Reserved names that end the run once observed
pub const CONTROL_TOOLS: [&str; 3] = ["finish", "stop", "exit"];

/// Whether `name` is one of the control signals
pub fn is_control_tool(name: &str) -> bool {
    CONTROL_TOOLS.contains(&name)
}

/// Result of tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,
    /// Output from the tool
    pub output: String,
    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process-style exit status
    pub exit_status: i32,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            exit_status: STATUS_OK,
        }
    }

    /// Create a failed result
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            exit_status: STATUS_ERROR,
        }
    }

    /// Create a failed result with output
    pub fn failure(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
            exit_status: STATUS_ERROR,
        }
    }

    /// A control signal: not a failure, but carries a reserved exit status
    pub fn signal(output: impl Into<String>, exit_status: i32) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            exit_status,
        }
    }
}

/// Context provided to tools during execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Root every file path is confined to
    pub workspace: Workspace,
    /// Maximum output length (truncate if exceeded)
    pub max_output_len: usize,
    /// Default timeout for HTTP requests in seconds
    pub http_timeout_secs: u64,
    /// Search service URL (DuckDuckGo when unset)
    pub search_endpoint: Option<String>,
    /// Fetch service URL (direct GET when unset)
    pub fetch_endpoint: Option<String>,
}

impl ToolContext {
    /// Create a new context for the given workspace
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            max_output_len: 20_000,
            http_timeout_secs: 30,
            search_endpoint: None,
            fetch_endpoint: None,
        }
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn with_search_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.search_endpoint = endpoint.filter(|e| !e.trim().is_empty());
        self
    }

    pub fn with_fetch_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.fetch_endpoint = endpoint.filter(|e| !e.trim().is_empty());
        self
    }

    /// Truncate output to the configured maximum at a char boundary
    pub fn truncate(&self, output: String) -> String {
        truncate_output(output, self.max_output_len)
    }
}

/// UTF-8 safe truncation with a trailing marker
pub fn truncate_output(output: String, max_len: usize) -> String {
    if output.len() <= max_len {
        return output;
    }

    let safe_end = output
        .char_indices()
        .take_while(|(idx, _)| *idx < max_len)
        .last()
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);

    format!(
        "{}\n\n[Output truncated at {} characters]",
        &output[..safe_end],
        safe_end
    )
}

/// The Tool trait that all built-in tools implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Argument synopsis shown to the model, e.g. `write <path> <content>`
    fn usage(&self) -> &str;

    /// Get a description of what the tool does
    fn description(&self) -> &str;

    /// Execute the tool with ordered string arguments
    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult>;
}

/// Fetch a required positional argument
pub(crate) fn required_arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing required argument: {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_tools() {
        assert!(is_control_tool("finish"));
        assert!(is_control_tool("stop"));
        assert!(is_control_tool("exit"));
        assert!(!is_control_tool("read"));
        assert!(!is_control_tool("Finish"));
    }

    #[test]
    fn test_truncate_output_utf8() {
        let text = "héllo wörld".repeat(10);
        let truncated = truncate_output(text.clone(), 7);
        assert!(truncated.starts_with("héllo"));
        assert!(truncated.contains("[Output truncated"));

        assert_eq!(truncate_output("short".to_string(), 100), "short");
    }

    #[test]
    fn test_result_constructors() {
        assert_eq!(ToolResult::success("ok").exit_status, STATUS_OK);
        assert_eq!(ToolResult::error("bad").exit_status, STATUS_ERROR);
        let stop = ToolResult::signal("STOP_SIGNAL", STATUS_STOP);
        assert!(stop.success);
        assert_eq!(stop.exit_status, 10);
    }

    #[test]
    fn test_required_arg() {
        let args = vec!["a".to_string()];
        assert_eq!(required_arg(&args, 0, "path").unwrap(), "a");
        let err = required_arg(&args, 1, "content").unwrap_err();
        assert!(err.to_string().contains("content"));
    }
}
