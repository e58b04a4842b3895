//! Allow-listed shell tool

use std::process::Stdio;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::tools::security::ShellFirewall;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Runs allow-listed commands without a shell. Registered as both `shell` and `run_shell`.
pub struct ShellTool {
    name: &'static str,
    firewall: ShellFirewall,
}

impl ShellTool {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            firewall: ShellFirewall::new(),
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        self.name
    }

    fn usage(&self) -> &str {
        if self.name == "shell" {
            "shell <command>"
        } else {
            "run_shell <command>"
        }
    }

    fn description(&self) -> &str {
        "Run an allow-listed command (ls, grep, ps, echo, cat, df, free, uptime, head, tail, wc, pwd). No pipes, redirects or substitutions."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let line = match args {
            [] => String::new(),
            [single] => single.clone(),
            many => shell_words::join(many),
        };

        let argv = match self.firewall.check(&line, ctx.workspace.root()) {
            Ok(argv) => argv,
            Err(violation) => {
                warn!(command = %line, %violation, "Shell command refused");
                return Ok(ToolResult::error(format!("Security Error: {}", violation)));
            }
        };

        debug!(program = %argv[0], args = argv.len() - 1, "Running allow-listed command");
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        Ok(run_captured(cmd, ctx).await)
    }
}

/// Run a prepared command in the workspace and fold its output into a [`ToolResult`].
///
/// The child is killed if the future is dropped, so the gateway timeout also
/// ends the process.
pub(super) async fn run_captured(mut cmd: Command, ctx: &ToolContext) -> ToolResult {
    cmd.current_dir(ctx.workspace.root())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match cmd.output().await {
        Ok(o) => o,
        Err(e) => return ToolResult::error(format!("Failed to execute command: {}", e)),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut combined = String::new();
    if !stdout.is_empty() {
        combined.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n--- stderr ---\n");
        }
        combined.push_str(&stderr);
    }
    let combined = ctx.truncate(combined);

    if output.status.success() {
        return ToolResult::success(combined);
    }

    let code = output.status.code().unwrap_or(-1);
    let mut result = ToolResult::failure(combined, format!("Command exited with code {}", code));
    if code > 0 {
        result.exit_status = code;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Workspace;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext::new(Workspace::open(dir.path()).unwrap())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_echo() {
        let dir = TempDir::new().unwrap();
        let tool = ShellTool::new("shell");

        let result = tool
            .execute(&["echo 'hello world'".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output.trim(), "hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runs_in_workspace() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);
        std::fs::write(ctx.workspace.root().join("marker.txt"), "x").unwrap();

        let tool = ShellTool::new("run_shell");
        let result = tool.execute(&["ls".to_string()], &ctx).await.unwrap();
        assert!(result.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_shell_refuses_chaining() {
        let dir = TempDir::new().unwrap();
        let tool = ShellTool::new("shell");

        let result = tool
            .execute(&["ls && rm -rf /".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Forbidden characters"));
    }

    #[tokio::test]
    async fn test_shell_refuses_unlisted() {
        let dir = TempDir::new().unwrap();
        let tool = ShellTool::new("shell");

        let result = tool
            .execute(&["curl".to_string(), "http://example.com".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not allowed"));
    }

    #[tokio::test]
    async fn test_shell_refuses_parent_escape() {
        let outer = TempDir::new().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "TOP-SECRET").unwrap();
        let ws = outer.path().join("ws");
        let ctx = ToolContext::new(Workspace::open(&ws).unwrap());
        let tool = ShellTool::new("shell");

        let result = tool
            .execute(&["cat ../secret.txt".to_string()], &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!result.output.contains("TOP-SECRET"));
        assert!(result.error.unwrap().starts_with("Security Error: Privacy Error"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_failure_status() {
        let dir = TempDir::new().unwrap();
        let tool = ShellTool::new("shell");

        let result = tool
            .execute(&["cat missing-file.txt".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
        assert_ne!(result.exit_status, 0);
    }
}
