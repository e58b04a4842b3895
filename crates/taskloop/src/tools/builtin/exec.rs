//! Python execution and package installation

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use super::shell::run_captured;
use crate::tools::security::validate_packages;
use crate::tools::{required_arg, Tool, ToolContext, ToolResult};

fn locate(program: &str) -> Result<std::path::PathBuf, ToolResult> {
    which::which(program).map_err(|_| ToolResult::error(format!("{} not found in PATH", program)))
}

/// Tool for running Python scripts or snippets in the workspace
pub struct RunPythonTool;

#[async_trait]
impl Tool for RunPythonTool {
    fn name(&self) -> &str {
        "run_python"
    }

    fn usage(&self) -> &str {
        "run_python <script.py [args...] | -c code>"
    }

    fn description(&self) -> &str {
        "Run a Python script from the workspace, or inline code with -c."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let first = required_arg(args, 0, "script")?;
        let python = match locate("python3") {
            Ok(p) => p,
            Err(result) => return Ok(result),
        };

        let mut cmd = Command::new(python);
        if first == "-c" {
            required_arg(args, 1, "code")?;
            cmd.arg("-c").arg(args[1..].join(" "));
        } else {
            let script = match ctx.workspace.resolve(first) {
                Ok(p) => p,
                Err(e) => return Ok(ToolResult::error(e.to_string())),
            };
            if !script.is_file() {
                return Ok(ToolResult::error(format!("Script not found: {}", first)));
            }
            cmd.arg(script).args(&args[1..]);
        }

        Ok(run_captured(cmd, ctx).await)
    }
}

/// Tool for installing Python packages with pip
pub struct PipInstallTool;

#[async_trait]
impl Tool for PipInstallTool {
    fn name(&self) -> &str {
        "pip_install"
    }

    fn usage(&self) -> &str {
        "pip_install <package>..."
    }

    fn description(&self) -> &str {
        "Install Python packages with pip."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        required_arg(args, 0, "package")?;
        if let Err(violation) = validate_packages(args) {
            return Ok(ToolResult::error(format!("Security Error: {}", violation)));
        }
        let python = match locate("python3") {
            Ok(p) => p,
            Err(result) => return Ok(result),
        };

        info!(packages = ?args, "Installing Python packages");
        let mut cmd = Command::new(python);
        cmd.args(["-m", "pip", "install", "--no-cache-dir"]).args(args);
        Ok(run_captured(cmd, ctx).await)
    }
}

/// Tool for installing system packages with apt
pub struct AptInstallTool;

#[async_trait]
impl Tool for AptInstallTool {
    fn name(&self) -> &str {
        "apt_install"
    }

    fn usage(&self) -> &str {
        "apt_install <package>..."
    }

    fn description(&self) -> &str {
        "Install system packages with apt-get."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        required_arg(args, 0, "package")?;
        if let Err(violation) = validate_packages(args) {
            return Ok(ToolResult::error(format!("Security Error: {}", violation)));
        }
        let apt = match locate("apt-get") {
            Ok(p) => p,
            Err(result) => return Ok(result),
        };

        info!(packages = ?args, "Installing system packages");
        let mut cmd = Command::new(apt);
        cmd.env("DEBIAN_FRONTEND", "noninteractive")
            .args(["install", "-y", "--no-install-recommends"])
            .args(args);
        Ok(run_captured(cmd, ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Workspace;
    use tempfile::TempDir;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext::new(Workspace::open(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn test_run_python_inline() {
        if which::which("python3").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let args = vec!["-c".to_string(), "print(6 * 7)".to_string()];

        let result = RunPythonTool.execute(&args, &ctx(&dir)).await.unwrap();
        assert!(result.success, "{:?}", result);
        assert_eq!(result.output.trim(), "42");
    }

    #[tokio::test]
    async fn test_run_python_script_must_be_inside() {
        if which::which("python3").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();

        let result = RunPythonTool
            .execute(&["../evil.py".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Access Denied"));
    }

    #[tokio::test]
    async fn test_pip_install_rejects_flags() {
        let dir = TempDir::new().unwrap();

        let result = PipInstallTool
            .execute(&["--index-url=http://evil".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid package"));
    }

    #[tokio::test]
    async fn test_apt_install_requires_package() {
        let dir = TempDir::new().unwrap();
        assert!(AptInstallTool.execute(&[], &ctx(&dir)).await.is_err());
    }
}
