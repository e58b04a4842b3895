//! Flow tools: wait, timestamp and the control signals

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::tools::{Tool, ToolContext, ToolResult, STATUS_EXIT, STATUS_STOP};

const MAX_WAIT_SECS: u64 = 30;

/// Tool that sleeps for a bounded number of seconds
pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn usage(&self) -> &str {
        "wait [seconds=1]"
    }

    fn description(&self) -> &str {
        "Sleep for up to 30 seconds."
    }

    async fn execute(&self, args: &[String], _ctx: &ToolContext) -> Result<ToolResult> {
        let secs = match args.first() {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(n) => n.min(MAX_WAIT_SECS),
                Err(_) => return Ok(ToolResult::error(format!("Invalid seconds: {}", raw))),
            },
            None => 1,
        };

        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok(ToolResult::success(format!("Waited {} seconds.", secs)))
    }
}

/// Tool that reports the current UTC time
pub struct TimestampTool;

#[async_trait]
impl Tool for TimestampTool {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn usage(&self) -> &str {
        "timestamp"
    }

    fn description(&self) -> &str {
        "Current UTC time in RFC 3339."
    }

    async fn execute(&self, _args: &[String], _ctx: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult::success(chrono::Utc::now().to_rfc3339()))
    }
}

/// Successful end of the session
pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn usage(&self) -> &str {
        "finish [message]"
    }

    fn description(&self) -> &str {
        "End the session successfully with a final message."
    }

    async fn execute(&self, args: &[String], _ctx: &ToolContext) -> Result<ToolResult> {
        let message = if args.is_empty() {
            "Task completed successfully.".to_string()
        } else {
            args.join(" ")
        };
        Ok(ToolResult::success(format!("FINISH_SIGNAL: {}", message)))
    }
}

/// Forced stop of the current run
pub struct StopTool;

#[async_trait]
impl Tool for StopTool {
    fn name(&self) -> &str {
        "stop"
    }

    fn usage(&self) -> &str {
        "stop"
    }

    fn description(&self) -> &str {
        "Force stop the current run."
    }

    async fn execute(&self, _args: &[String], _ctx: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult::signal("STOP_SIGNAL: Stopping the current run.", STATUS_STOP))
    }
}

/// Forced exit of the whole environment
pub struct ExitTool;

#[async_trait]
impl Tool for ExitTool {
    fn name(&self) -> &str {
        "exit"
    }

    fn usage(&self) -> &str {
        "exit"
    }

    fn description(&self) -> &str {
        "Force exit the environment."
    }

    async fn execute(&self, _args: &[String], _ctx: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult::signal("EXIT_SIGNAL: Exiting the environment.", STATUS_EXIT))
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
    async fn test_finish_message() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        let result = FinishTool
            .execute(&["report".to_string(), "written".to_string()], &ctx)
            .await
            .unwrap();
        assert_eq!(result.output, "FINISH_SIGNAL: report written");
        assert_eq!(result.exit_status, 0);

        let result = FinishTool.execute(&[], &ctx).await.unwrap();
        assert_eq!(result.output, "FINISH_SIGNAL: Task completed successfully.");
    }

    #[tokio::test]
    async fn test_stop_and_exit_statuses() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(&dir);

        let stop = StopTool.execute(&[], &ctx).await.unwrap();
        assert!(stop.output.starts_with("STOP_SIGNAL"));
        assert_eq!(stop.exit_status, STATUS_STOP);

        let exit = ExitTool.execute(&[], &ctx).await.unwrap();
        assert!(exit.output.starts_with("EXIT_SIGNAL"));
        assert_eq!(exit.exit_status, STATUS_EXIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_capped() {
        let dir = TempDir::new().unwrap();
        let result = WaitTool
            .execute(&["600".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert_eq!(result.output, "Waited 30 seconds.");
    }

    #[tokio::test]
    async fn test_timestamp_parses() {
        let dir = TempDir::new().unwrap();
        let result = TimestampTool.execute(&[], &ctx(&dir)).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&result.output).is_ok());
    }
}
