//! Action contract: decoding one model turn into a thought and tool calls

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.arguments {
            write!(f, " {:?}", arg)?;
        }
        Ok(())
    }
}

/// A decoded model turn
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub thought: String,
    pub tool_calls: Vec<Action>,
    pub memory_update: Option<Map<String, Value>>,
}

/// Why a model turn was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("The response was empty.")]
    Empty,

    #[error("The response is not valid JSON ({0}).")]
    InvalidJson(String),

    #[error("The response must be a single JSON object.")]
    NotAnObject,

    #[error("The response is missing the required key \"{0}\".")]
    MissingKey(&'static str),

    #[error("\"{key}\" must be {expected}.")]
    WrongType { key: String, expected: &'static str },

    #[error("tool_calls[{index}]: {reason}")]
    InvalidCall { index: usize, reason: String },

    #[error("The \"tool_call\" string syntax with <arg> tags is not supported; use the \"tool_calls\" array.")]
    LegacySyntax,
}

/// Canonical reply shown in corrective turns and the system prompt
pub const CONTRACT_EXAMPLE: &str = r#"{
  "thought": "what you are doing and why",
  "tool_calls": [
    {"name": "write", "arguments": ["notes.md", "first draft"]},
    {"name": "read", "arguments": ["task.md"]}
  ]
}"#;

impl ContractError {
    /// User turn appended after a rejected reply
    pub fn corrective_text(&self) -> String {
        format!(
            "Your last response could not be used: {}\n\
             Reply with exactly one JSON object and nothing else, in this format:\n{}\n\
             Use an empty \"tool_calls\" list if no action is needed this step.",
            self, CONTRACT_EXAMPLE
        )
    }
}

/// Parse raw model output into an [`AgentReply`]
pub fn parse_reply(raw: &str) -> Result<AgentReply, ContractError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(ContractError::Empty);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| ContractError::InvalidJson(e.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(ContractError::NotAnObject);
    };

    if !obj.contains_key("tool_calls") && matches!(obj.get("tool_call"), Some(Value::String(_))) {
        return Err(ContractError::LegacySyntax);
    }

    let thought = match obj.remove("thought") {
        Some(Value::String(s)) => s,
        Some(_) => return Err(wrong_type("thought", "a string")),
        None => return Err(ContractError::MissingKey("thought")),
    };

    let calls = match obj.remove("tool_calls") {
        Some(Value::Array(calls)) => calls,
        Some(_) => return Err(wrong_type("tool_calls", "an array")),
        None => return Err(ContractError::MissingKey("tool_calls")),
    };
    let tool_calls = calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| parse_action(call).map_err(|reason| ContractError::InvalidCall { index, reason }))
        .collect::<Result<Vec<_>, _>>()?;

    let memory_update = match obj.remove("memory_update") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return Err(wrong_type("memory_update", "an object")),
    };

    Ok(AgentReply {
        thought,
        tool_calls,
        memory_update,
    })
}

fn wrong_type(key: &str, expected: &'static str) -> ContractError {
    ContractError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn parse_action(call: Value) -> Result<Action, String> {
    let Value::Object(mut obj) = call else {
        return Err("each tool call must be an object with \"name\" and \"arguments\"".to_string());
    };

    let name = match obj.remove("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => return Err("\"name\" must not be empty".to_string()),
        Some(_) => return Err("\"name\" must be a string".to_string()),
        None => return Err("missing \"name\"".to_string()),
    };

    let arguments = match obj.remove("arguments") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.into_iter().map(coerce_argument).collect(),
        Some(_) => return Err("\"arguments\" must be an array".to_string()),
    };

    Ok(Action::new(name, arguments))
}

/// Arguments are strings on the wire; other JSON values keep their JSON text
fn coerce_argument(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Remove one surrounding ```json / ``` fence
fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let Some(body) = rest.trim_end().strip_suffix("```") else {
        return content;
    };
    // Drop the info string (e.g. `json`) on the opening line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}
