//! Tool gateway: the boundary between the control loop and tool execution
//!
//! The loop only ever sees `(text, exit_status)`; nothing raised inside a
//! tool crosses this boundary.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::registry::ToolRegistry;
use super::{ToolContext, ToolResult, STATUS_ERROR, STATUS_TIMEOUT};

/// Raw outcome of one gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOutput {
    /// Primary output (stdout for process tools)
    pub text: String,
    /// Error output (stderr for process tools)
    pub error_text: String,
    pub exit_status: i32,
}

impl GatewayOutput {
    pub fn failure(error_text: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error_text: error_text.into(),
            exit_status: STATUS_ERROR,
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self {
            text: String::new(),
            error_text: format!("Error: Tool execution timed out after {}s.", after.as_secs()),
            exit_status: STATUS_TIMEOUT,
        }
    }

    /// Nonzero status or any error text
    pub fn is_error(&self) -> bool {
        self.exit_status != 0 || !self.error_text.trim().is_empty()
    }

    /// Output and error text joined the way the model sees them
    pub fn combined(&self) -> String {
        match (self.text.trim().is_empty(), self.error_text.trim().is_empty()) {
            (_, true) => self.text.clone(),
            (true, false) => self.error_text.clone(),
            (false, false) => format!("{}\n--- stderr ---\n{}", self.text, self.error_text),
        }
    }
}

#[cfg(test)]
impl GatewayOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error_text: String::new(),
            exit_status: 0,
        }
    }
}

impl From<ToolResult> for GatewayOutput {
    fn from(result: ToolResult) -> Self {
        Self {
            text: result.output,
            error_text: result.error.unwrap_or_default(),
            exit_status: result.exit_status,
        }
    }
}

/// Executes one named action with ordered string arguments under a timeout
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn invoke(&self, name: &str, args: &[String], timeout: Duration) -> GatewayOutput;

    /// Tool list for the system prompt, one `- usage: description` per line
    fn describe_tools(&self) -> String;
}

/// Reserved tool names with their argument synopsis, for gateways without a registry
pub const RESERVED_TOOLS: &[(&str, &str)] = &[
    ("read <path>", "Read a file."),
    ("write <path> <content>", "Write a file; the previous version is kept in deleted-modified/."),
    ("append <path> <content>", "Append to a file."),
    ("mkdir <path>", "Create a directory."),
    ("list [path]", "List a directory."),
    ("edit <path> <old> <new>", "Replace exactly one occurrence of <old> with <new>."),
    ("web_search <query> [num_results=5]", "Search the web."),
    ("web_fetch <url> [max_chars=2000]", "Fetch a URL as text."),
    ("http <method> <url> [body]", "Send an HTTP request."),
    ("shell <command>", "Run an allow-listed command (ls, grep, ps, echo, cat, df, free, uptime)."),
    ("run_shell <command>", "Same as shell."),
    ("run_python <script.py | -c code>", "Run Python in the workspace."),
    ("pip_install <package>...", "Install Python packages."),
    ("apt_install <package>...", "Install system packages."),
    ("wait [seconds=1]", "Sleep."),
    ("timestamp", "Current UTC time."),
    ("finish [message]", "Finish the session successfully."),
    ("stop", "Force stop execution."),
    ("exit", "Force exit the sandbox environment."),
];

/// In-process gateway over the built-in tool registry
pub struct BuiltinGateway {
    registry: ToolRegistry,
    ctx: ToolContext,
}

impl BuiltinGateway {
    pub fn new(registry: ToolRegistry, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }
}

#[async_trait]
impl ToolGateway for BuiltinGateway {
    #[instrument(skip(self, args), fields(args = args.len()))]
    async fn invoke(&self, name: &str, args: &[String], limit: Duration) -> GatewayOutput {
        let tool = match self.registry.get(name) {
            Some(t) => t,
            None => {
                warn!(tool = %name, "Tool not found");
                return GatewayOutput::failure(format!("Error: Tool '{}' not recognized.", name));
            }
        };

        info!(tool = %name, "Executing tool");
        match timeout(limit, tool.execute(args, &self.ctx)).await {
            Ok(Ok(result)) => {
                if result.success {
                    debug!(tool = %name, output_len = result.output.len(), status = result.exit_status, "Tool executed");
                } else {
                    warn!(tool = %name, error = ?result.error, "Tool execution failed");
                }
                result.into()
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool execution error");
                GatewayOutput::failure(format!("Error: {}", e))
            }
            Err(_) => {
                warn!(tool = %name, timeout_secs = limit.as_secs(), "Tool timed out");
                GatewayOutput::timed_out(limit)
            }
        }
    }

    fn describe_tools(&self) -> String {
        self.registry.describe()
    }
}

impl std::fmt::Debug for BuiltinGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinGateway")
            .field("registry", &self.registry)
            .field("workspace", &self.ctx.workspace.root())
            .finish()
    }
}

/// Gateway that runs an external tool program as `program... <name> <args...>`
#[derive(Debug, Clone)]
pub struct ProcessGateway {
    program: Vec<String>,
    working_dir: PathBuf,
    max_output_len: usize,
}

impl ProcessGateway {
    pub fn new(program: Vec<String>, working_dir: PathBuf) -> anyhow::Result<Self> {
        if program.is_empty() {
            anyhow::bail!("Process gateway requires a program to run");
        }
        Ok(Self {
            program,
            working_dir,
            max_output_len: 20_000,
        })
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    fn build_command(&self, name: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program[0]);
        cmd.args(&self.program[1..])
            .arg(name)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ToolGateway for ProcessGateway {
    #[instrument(skip(self, args), fields(args = args.len()))]
    async fn invoke(&self, name: &str, args: &[String], limit: Duration) -> GatewayOutput {
        let mut cmd = self.build_command(name, args);

        match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => {
                let exit_status = output.status.code().unwrap_or(-1);
                debug!(tool = %name, exit_status, "Tool process exited");
                GatewayOutput {
                    text: super::truncate_output(
                        String::from_utf8_lossy(&output.stdout).into_owned(),
                        self.max_output_len,
                    ),
                    error_text: super::truncate_output(
                        String::from_utf8_lossy(&output.stderr).into_owned(),
                        self.max_output_len,
                    ),
                    exit_status,
                }
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Failed to spawn tool process");
                GatewayOutput::failure(format!("Execution failed: {}", e))
            }
            Err(_) => {
                warn!(tool = %name, timeout_secs = limit.as_secs(), "Tool process timed out");
                GatewayOutput::timed_out(limit)
            }
        }
    }

    fn describe_tools(&self) -> String {
        RESERVED_TOOLS
            .iter()
            .map(|(usage, description)| format!("- {}: {}", usage, description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
