//! Generic HTTP request tool

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, warn};

use super::shared_client;
use super::web_fetch::guard_private_host;
use crate::tools::{required_arg, Tool, ToolContext, ToolResult};

/// Tool for sending arbitrary HTTP requests
pub struct HttpTool;

fn parse_method(raw: &str) -> Option<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "HEAD" => Some(Method::HEAD),
        _ => None,
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        "http"
    }

    fn usage(&self) -> &str {
        "http <method> <url> [body]"
    }

    fn description(&self) -> &str {
        "Send an HTTP request (GET, POST, PUT, PATCH, DELETE, HEAD); returns the status line and body."
    }

    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let raw_method = required_arg(args, 0, "method")?;
        let url = required_arg(args, 1, "url")?;
        let body = (args.len() > 2).then(|| args[2..].join(" "));

        let Some(method) = parse_method(raw_method) else {
            return Ok(ToolResult::error(format!(
                "Invalid HTTP method: {}. Must be GET, POST, PUT, PATCH, DELETE or HEAD.",
                raw_method
            )));
        };

        let parsed = match url::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(_) => return Ok(ToolResult::error("Only HTTP and HTTPS URLs are supported")),
            Err(e) => return Ok(ToolResult::error(format!("Invalid URL: {}", e))),
        };
        if let Some(refused) = guard_private_host(&parsed) {
            return Ok(refused);
        }

        debug!(%method, url, has_body = body.is_some(), "Sending HTTP request");
        let mut request = shared_client()
            .request(method, parsed)
            .timeout(Duration::from_secs(ctx.http_timeout_secs));
        if let Some(body) = body {
            let looks_json = body.trim_start().starts_with(['{', '[']);
            if looks_json {
                request = request.header("content-type", "application/json");
            }
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "HTTP request failed");
                return Ok(ToolResult::error(format!("Request failed: {}", e)));
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return Ok(ToolResult::error(format!("Failed to read response: {}", e))),
        };
        let output = ctx.truncate(format!("HTTP {}\n\n{}", status, text));

        if status.is_client_error() || status.is_server_error() {
            Ok(ToolResult::failure(output, format!("HTTP error: {}", status)))
        } else {
            Ok(ToolResult::success(output))
        }
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

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get"), Some(Method::GET));
        assert_eq!(parse_method("Patch"), Some(Method::PATCH));
        assert_eq!(parse_method("TRACE"), None);
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let dir = TempDir::new().unwrap();
        let args = vec!["CONNECT".to_string(), "https://example.com".to_string()];

        let result = HttpTool.execute(&args, &ctx(&dir)).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid HTTP method"));
    }

    #[tokio::test]
    async fn test_blocks_private_hosts() {
        let dir = TempDir::new().unwrap();
        let args = vec!["GET".to_string(), "http://localhost:8080/admin".to_string()];

        let result = HttpTool.execute(&args, &ctx(&dir)).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("SSRF"));
    }

    #[tokio::test]
    async fn test_missing_url_is_err() {
        let dir = TempDir::new().unwrap();
        assert!(HttpTool.execute(&["GET".to_string()], &ctx(&dir)).await.is_err());
    }
}
