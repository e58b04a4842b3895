//! Web search tool: configured search service, or DuckDuckGo HTML

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};

use super::shared_client;
use crate::tools::{required_arg, Tool, ToolContext, ToolResult};

const DEFAULT_RESULTS: usize = 5;

/// Tool for searching the web
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn usage(&self) -> &str {
        "web_search <query> [num_results=5]"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs and snippets."
    }

    #[instrument(skip(self, args, ctx), fields(query = tracing::field::Empty))]
    async fn execute(&self, args: &[String], ctx: &ToolContext) -> Result<ToolResult> {
        let query = required_arg(args, 0, "query")?;
        tracing::Span::current().record("query", query.chars().take(50).collect::<String>().as_str());

        let limit = match args.get(1) {
            Some(n) => match n.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Ok(ToolResult::error(format!("Invalid num_results: {}", n))),
            },
            None => DEFAULT_RESULTS,
        };

        match &ctx.search_endpoint {
            Some(endpoint) => search_endpoint(endpoint, query, limit, ctx).await,
            None => search_duckduckgo(query, limit, ctx).await,
        }
    }
}

/// `GET <endpoint>?q=<query>&num_results=<n>`, body returned as-is
async fn search_endpoint(endpoint: &str, query: &str, limit: usize, ctx: &ToolContext) -> Result<ToolResult> {
    debug!(endpoint, limit, "Sending search request to service");
    let response = match shared_client()
        .get(endpoint)
        .query(&[("q", query.to_string()), ("num_results", limit.to_string())])
        .timeout(Duration::from_secs(ctx.http_timeout_secs))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Search request failed");
            return Ok(ToolResult::error(format!("Error: {}", e)));
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Ok(ToolResult::error(format!("Error: search service returned {}", status)));
    }
    match response.text().await {
        Ok(body) => Ok(ToolResult::success(ctx.truncate(body))),
        Err(e) => Ok(ToolResult::error(format!("Failed to read response: {}", e))),
    }
}

async fn search_duckduckgo(query: &str, limit: usize, ctx: &ToolContext) -> Result<ToolResult> {
    let search_url = format!(
        "https://html.duckduckgo.com/html/?q={}",
        urlencoding::encode(query)
    );

    debug!(limit, "Sending search request to DuckDuckGo");
    let response = match shared_client()
        .get(&search_url)
        .timeout(Duration::from_secs(ctx.http_timeout_secs))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Search request failed");
            return Ok(ToolResult::error(format!("Search request failed: {}", e)));
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), "Search returned error status");
        return Ok(ToolResult::error(format!("Search failed with status: {}", response.status())));
    }

    let html = match response.text().await {
        Ok(h) => h,
        Err(e) => return Ok(ToolResult::error(format!("Failed to read response: {}", e))),
    };

    let results = parse_duckduckgo_results(&html, limit);
    if results.is_empty() {
        return Ok(ToolResult::success(format!("No results found for: {}", query)));
    }

    Ok(ToolResult::success(ctx.truncate(format_results(query, &results))))
}

#[derive(Debug, PartialEq)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    let mut output = format!("Search results for '{}':\n\n", query);
    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. {}\n   {}\n   {}\n\n",
            i + 1,
            result.title,
            result.url,
            result.snippet
        ));
    }
    output
}

fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(result_selector), Ok(title_selector), Ok(snippet_selector)) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for result_el in document.select(&result_selector) {
        if results.len() >= limit {
            break;
        }

        let title_el = result_el.select(&title_selector).next();
        let title = title_el
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        let url = title_el
            .and_then(|el| el.value().attr("href"))
            .map(unwrap_redirect)
            .unwrap_or_default();

        let snippet = result_el
            .select(&snippet_selector)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
            .trim()
            .to_string();

        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult { title, url, snippet });
        }
    }

    results
}

/// DuckDuckGo wraps target URLs as `/l/?uddg=<encoded>&...`
fn unwrap_redirect(href: &str) -> String {
    href.split("uddg=")
        .nth(1)
        .map(|s| s.split('&').next().unwrap_or(s))
        .and_then(|s| urlencoding::decode(s).ok())
        .map(|s| s.into_owned())
        .unwrap_or_else(|| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Workspace;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_results() {
        let html = "<html><body></body></html>";
        assert!(parse_duckduckgo_results(html, 10).is_empty());
    }

    #[test]
    fn test_parse_results_with_redirect_and_limit() {
        let html = r#"
            <div class="result">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&rut=abc">Rust</a>
              <a class="result__snippet">A language empowering everyone.</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://docs.rs/">Docs.rs</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://crates.io/">crates.io</a>
            </div>
        "#;

        let results = parse_duckduckgo_results(html, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.rust-lang.org/");
        assert_eq!(results[0].snippet, "A language empowering everyone.");
        assert_eq!(results[1].title, "Docs.rs");
        assert!(format_results("rust", &results).contains("2. Docs.rs"));
    }

    #[tokio::test]
    async fn test_invalid_num_results() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(Workspace::open(dir.path()).unwrap());

        let result = WebSearchTool
            .execute(&["rust".to_string(), "lots".to_string()], &ctx)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("num_results"));
    }
}
