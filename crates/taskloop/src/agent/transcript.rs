//! Human-readable transcript log and its summary
//!
//! Events are appended as `\n--- LABEL ---\n<content>\n`. The log is a record
//! for people; nothing is recovered from it. Content lines that look like a
//! marker are written with a leading space so they stay inside their event.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Event labels written to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    LlmInput,
    LlmResponse,
    Thought,
    ToolCall,
    ToolResult,
    Observation,
    Interruption,
    ContractError,
    Compaction,
    Terminated,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::LlmInput => "LLM_INPUT",
            Label::LlmResponse => "LLM_RESPONSE",
            Label::Thought => "THOUGHT",
            Label::ToolCall => "TOOL_CALL",
            Label::ToolResult => "TOOL_RESULT",
            Label::Observation => "OBSERVATION",
            Label::Interruption => "INTERRUPTION",
            Label::ContractError => "CONTRACT_ERROR",
            Label::Compaction => "COMPACTION",
            Label::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only transcript file
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one event. Failures are logged and otherwise ignored.
    pub fn record(&self, label: Label, content: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| write!(f, "\n--- {} ---\n{}\n", label, escape_markers(content)));

        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to write transcript log");
        }
    }
}

/// One parsed log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub label: String,
    pub content: String,
}

fn marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?m)^--- ([A-Z_]+) ---$").expect("marker pattern is valid"))
}

fn escape_markers(content: &str) -> std::borrow::Cow<'_, str> {
    marker().replace_all(content, " $0")
}

/// Split a transcript log back into events
pub fn parse_log(text: &str) -> Vec<LogEvent> {
    let markers: Vec<_> = marker().captures_iter(text).collect();
    let mut events = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        events.push(LogEvent {
            label: label.as_str().to_string(),
            content: text[whole.end()..end].trim_matches('\n').to_string(),
        });
    }

    events
}

/// Counts and highlights of one transcript
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    pub cycles: usize,
    pub tool_calls: usize,
    pub errors: usize,
    pub files_written: usize,
    pub contract_errors: usize,
    pub interruptions: usize,
    pub compactions: usize,
    pub last_thought: Option<String>,
    pub last_tool_call: Option<String>,
    pub outcome: Option<String>,
}

impl LogSummary {
    pub fn from_events(events: &[LogEvent]) -> Self {
        let mut summary = Self::default();

        for event in events {
            match event.label.as_str() {
                "LLM_RESPONSE" => summary.cycles += 1,
                "THOUGHT" => summary.last_thought = Some(event.content.clone()),
                "TOOL_CALL" => {
                    summary.tool_calls += 1;
                    summary.last_tool_call = Some(event.content.clone());
                }
                "TOOL_RESULT" => {
                    let header = event.content.lines().next().unwrap_or("");
                    if header.contains("[error]") {
                        summary.errors += 1;
                    } else if event.content.contains("Written:") {
                        summary.files_written += 1;
                    }
                }
                "CONTRACT_ERROR" => summary.contract_errors += 1,
                "INTERRUPTION" => summary.interruptions += 1,
                "COMPACTION" => summary.compactions += 1,
                "TERMINATED" => {
                    summary.outcome = event.content.split_whitespace().next().map(str::to_string)
                }
                _ => {}
            }
        }

        summary
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model cycles        : {}", self.cycles)?;
        writeln!(f, "Tool calls          : {}", self.tool_calls)?;
        writeln!(f, "Error results       : {}", self.errors)?;
        writeln!(f, "Files written       : {}", self.files_written)?;
        writeln!(f, "Contract errors     : {}", self.contract_errors)?;
        writeln!(f, "Interruptions       : {}", self.interruptions)?;
        writeln!(f, "Compactions         : {}", self.compactions)?;
        writeln!(f, "Outcome             : {}", self.outcome.as_deref().unwrap_or("(running)"))?;
        writeln!(f)?;
        writeln!(f, "Last thought:")?;
        writeln!(f, "{}", self.last_thought.as_deref().unwrap_or("None"))?;
        writeln!(f)?;
        writeln!(f, "Last tool call:")?;
        write!(f, "{}", self.last_tool_call.as_deref().unwrap_or("None"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session_log.txt");
        let log = TranscriptLog::new(&path);

        log.record(Label::LlmResponse, r#"{"thought": "x", "tool_calls": []}"#);
        log.record(Label::Thought, "look around\nthen write");
        log.record(Label::ToolCall, "write \"a.txt\" \"hi\"");
        log.record(Label::ToolResult, "write [ok] (status 0)\nWritten: a.txt");
        log.record(Label::ToolCall, "read \"missing\"");
        log.record(Label::ToolResult, "read [error] (status 1)\nError: Not found.");
        log.record(Label::Terminated, "exhausted after 3 steps");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("\n--- LLM_RESPONSE ---\n"));

        let events = parse_log(&text);
        assert_eq!(events.len(), 7);
        assert_eq!(events[1].label, "THOUGHT");
        assert_eq!(events[1].content, "look around\nthen write");

        let summary = LogSummary::from_events(&events);
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.tool_calls, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.files_written, 1);
        assert_eq!(summary.last_tool_call.as_deref(), Some("read \"missing\""));
        assert_eq!(summary.outcome.as_deref(), Some("exhausted"));
        assert!(summary.to_string().contains("Tool calls          : 2"));
    }

    #[test]
    fn test_parse_ignores_inline_dashes() {
        let text = "\n--- OBSERVATION ---\nsome --- text --- here\n";
        let events = parse_log(text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, "some --- text --- here");
    }

    #[test]
    fn test_marker_lines_in_content_stay_in_event() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session_log.txt");
        let log = TranscriptLog::new(&path);

        log.record(Label::ToolCall, "read \"old_log.txt\"");
        log.record(Label::ToolResult, "read [ok] (status 0)\n--- TOOL_CALL ---\nwrite \"x\" \"y\"\n--- TERMINATED ---");

        let events = parse_log(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(events.len(), 2);
        assert!(events[1].content.contains(" --- TOOL_CALL ---"));

        let summary = LogSummary::from_events(&events);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.outcome, None);
    }

    #[test]
    fn test_unwritable_log_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("log.txt");
        let log = TranscriptLog::new(&path);
        log.record(Label::Thought, "ignored");
        assert!(!path.exists());
    }
}
