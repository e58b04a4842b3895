//! Web fetch tool: configured fetch service, or a direct GET reduced to text

use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::shared_client;
use crate::tools::{required_arg, Tool, ToolContext, ToolResult};

const DEFAULT_MAX_CHARS: usize = 2000;

/// Check if an IP address is in a private/reserved range (SSRF protection)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                || ipv4.octets()[0] == 100 && (ipv4.octets()[1] & 0xC0) == 64 // CGNAT
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6
                    .to_ipv4_mapped()
                    .map(|v4| v4.is_loopback() || v4.is_private() || v4.is_link_local())
                    .unwrap_or(false)
        }
    }
}

/// Tool for fetching web content
pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn usage(&self) -> &str {
        "web_fetch <url> [max_chars=2000]"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text."
    }

    #[instrument(skip(self, args, ctx), fields(url = tracing::field::Empty))]
    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let url = required_arg(args, 0, "url")?;
        tracing::Span::current().record("url", url.chars().take(100).collect::<String>().as_str());

        let max_chars = match args.get(1) {
            Some(n) => match n.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Ok(ToolResult::error(format!("Invalid max_chars: {}", n))),
            },
            None => DEFAULT_MAX_CHARS,
        };

        let parsed_url = match url::Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!(url, error = %e, "Invalid URL");
                return Ok(ToolResult::error(format!("Invalid URL: {}", e)));
            }
        };
        if parsed_url.scheme() != "http" && parsed_url.scheme() != "https" {
            return Ok(ToolResult::error("Only HTTP and HTTPS URLs are supported"));
        }

        match &ctx.fetch_endpoint {
            Some(endpoint) => fetch_via_service(endpoint, url, max_chars, ctx).await,
            None => fetch_direct(&parsed_url, max_chars, ctx).await,
        }
    }
}

/// `POST <endpoint>` with `{url, extract_mode: "text", max_chars}`, body returned as-is
async fn fetch_via_service(endpoint: &str, url: &str, max_chars: usize, ctx: &ToolContext) -> Result<ToolResult> {
    debug!(endpoint, max_chars, "Sending fetch request to service");
    let payload = json!({
        "url": url,
        "extract_mode": "text",
        "max_chars": max_chars,
    });

    let response = match shared_client()
        .post(endpoint)
        .json(&payload)
        .timeout(Duration::from_secs(ctx.http_timeout_secs))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Fetch service request failed");
            return Ok(ToolResult::error(format!("Error: {}", e)));
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Ok(ToolResult::error(format!("Error: fetch service returned {}", status)));
    }
    match response.text().await {
        Ok(body) => Ok(ToolResult::success(ctx.truncate(body))),
        Err(e) => Ok(ToolResult::error(format!("Failed to read response: {}", e))),
    }
}

/// Refuse hosts that resolve to private or reserved addresses
pub(super) fn guard_private_host(url: &url::Url) -> Option<ToolResult> {
    let host = url.host_str()?;
    let port = url.port_or_known_default().unwrap_or(80);
    let addr_str = format!("{}:{}", host, port);

    // Resolution failures are left to the request itself
    let addrs = addr_str.to_socket_addrs().ok()?;
    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            warn!(host, ip = %addr.ip(), "SSRF protection blocked private IP");
            return Some(ToolResult::error(format!(
                "SSRF protection: Access to private/reserved IP address {} is blocked",
                addr.ip()
            )));
        }
    }
    None
}

async fn fetch_direct(url: &url::Url, max_chars: usize, ctx: &ToolContext) -> Result<ToolResult> {
    if let Some(refused) = guard_private_host(url) {
        return Ok(refused);
    }

    debug!("Sending HTTP request");
    let response = match shared_client()
        .get(url.as_str())
        .timeout(Duration::from_secs(ctx.http_timeout_secs))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Failed to fetch URL");
            return Ok(ToolResult::error(format!("Failed to fetch URL: {}", e)));
        }
    };

    let status = response.status();
    debug!(status = %status, "HTTP response received");
    if !status.is_success() {
        warn!(status = %status, "HTTP error response");
        return Ok(ToolResult::error(format!("HTTP error: {}", status)));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = match response.text().await {
        Ok(b) => b,
        Err(e) => return Ok(ToolResult::error(format!("Failed to read response: {}", e))),
    };

    let text = if content_type.contains("text/html") {
        html_to_text(&body)
    } else if content_type.contains("application/json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    Ok(ToolResult::success(limit_chars(&text, max_chars)))
}

/// Keep the first `max` characters
fn limit_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n\n[Content truncated at {} characters]", &text[..idx], max),
        None => text.to_string(),
    }
}

/// Convert HTML to plain text, preferring the main content region
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let selectors = [
        "article",
        "main",
        "[role='main']",
        ".content",
        "#content",
        "body",
    ];

    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = element_text(element);
                if !text.trim().is_empty() {
                    return text;
                }
            }
        }
    }

    document.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Text of an element with block elements on their own lines
fn element_text(element: ElementRef) -> String {
    let mut lines = Vec::new();
    let mut current = String::new();
    collect_text(element, &mut lines, &mut current);
    if !current.is_empty() {
        lines.push(current);
    }

    lines
        .into_iter()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef, lines: &mut Vec<String>, current: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(trimmed);
                }
            }
            Node::Element(el) => {
                let tag = el.name();
                if matches!(tag, "script" | "style" | "noscript") {
                    continue;
                }
                let block = matches!(
                    tag,
                    "p" | "div" | "br" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "tr"
                );
                if block && !current.is_empty() {
                    lines.push(std::mem::take(current));
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, lines, current);
                }
            }
            _ => {}
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
    fn test_html_to_text() {
        let html = r#"
            <html>
            <body>
                <h1>Title</h1>
                <p>First paragraph.</p>
                <p>Second paragraph.</p>
            </body>
            </html>
        "#;

        let text = html_to_text(html);
        assert_eq!(text, "Title\nFirst paragraph.\nSecond paragraph.");
    }

    #[test]
    fn test_html_to_text_strips_scripts() {
        let html = r#"
            <html>
            <body>
                <p>Content</p>
                <script>alert('evil');</script>
            </body>
            </html>
        "#;

        let text = html_to_text(html);
        assert!(text.contains("Content"));
        assert!(!text.contains("alert"));
    }

    #[test]
    fn test_html_prefers_article() {
        let html = "<body><nav>Menu</nav><article><p>Story</p></article></body>";
        assert_eq!(html_to_text(html), "Story");
    }

    #[test]
    fn test_limit_chars() {
        assert_eq!(limit_chars("short", 10), "short");
        let limited = limit_chars("ééééé", 2);
        assert!(limited.starts_with("éé\n"));
    }

    #[test]
    fn test_private_ip() {
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"10.1.2.3".parse().unwrap()));
        assert!(is_private_ip(&"100.64.0.1".parse().unwrap()));
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(!is_private_ip(&"93.184.216.34".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_blocks_loopback() {
        let dir = TempDir::new().unwrap();
        let result = WebFetchTool
            .execute(&["http://127.0.0.1:9/".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("SSRF"));
    }

    #[tokio::test]
    async fn test_rejects_non_http() {
        let dir = TempDir::new().unwrap();
        let result = WebFetchTool
            .execute(&["file:///etc/passwd".to_string()], &ctx(&dir))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
