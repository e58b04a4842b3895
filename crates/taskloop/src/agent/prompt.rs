//! Prompt text: the system turn, the opening turn and per-step turns

use std::path::Path;

use serde_json::{Map, Value};

use super::contract::CONTRACT_EXAMPLE;
use crate::tools::security::{ALLOWED_COMMANDS, FORBIDDEN_PATTERNS};

const DEFAULT_PREAMBLE: &str = "\
You are an autonomous agent working through a task step by step inside a sandboxed workspace. \
Each step you think briefly, call tools, and read their results in the next message.";

const PERFORMANCE_RULES: &str = "\
1. Do not rewrite a file right after reading it unless the task asks for a change or you are adding new results.
2. If a file you read looks correct, do not write it back; move on to the next step.
3. Only write a file when you have new data or a new synthesis.
4. Tool calls in one response run at the same time; never make one depend on another in the same response.";

/// Inputs for the system turn
pub struct SystemPrompt<'a> {
    /// Replaces the built-in preamble when set
    pub preamble: Option<&'a str>,
    pub workspace_root: &'a Path,
    pub tool_list: &'a str,
    pub progress_file: &'a str,
    pub task: &'a str,
}

impl SystemPrompt<'_> {
    pub fn render(&self) -> String {
        let preamble = self
            .preamble
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PREAMBLE);
        let forbidden: Vec<String> = FORBIDDEN_PATTERNS.iter().map(|c| c.to_string()).collect();

        format!(
            "{preamble}\n\n\
             RESTRICTIONS:\n\
             - Working directory: {root}. All paths are relative to it and must stay inside it.\n\
             - The shell tool only runs: {allowed}.\n\
             - These characters are forbidden in shell commands: {forbidden}\n\n\
             PERFORMANCE RULES:\n{rules}\n\n\
             RESPONSE FORMAT:\n\
             Every response must be exactly one JSON object:\n{example}\n\
             \"arguments\" is an ordered list of strings. An empty \"tool_calls\" list means no action this step.\n\
             You may add \"memory_update\": {{...}} with any state you want to carry between steps; \
             it is shown back to you every step.\n\n\
             AVAILABLE TOOLS:\n{tools}\n\n\
             PROGRESS:\n\
             Keep a running summary of what you have done and what remains in {progress}. \
             Older messages may be removed to save space; {progress} is how you remember them.\n\
             Call finish with a final message when the task is complete.\n\n\
             YOUR TASK IS:\n\n{task}",
            preamble = preamble,
            root = self.workspace_root.display(),
            allowed = ALLOWED_COMMANDS.join(", "),
            forbidden = forbidden.join(" "),
            rules = PERFORMANCE_RULES,
            example = CONTRACT_EXAMPLE,
            tools = self.tool_list,
            progress = self.progress_file,
            task = self.task.trim(),
        )
    }
}

/// First user turn of a session
pub fn initial_turn(progress_file: &str) -> String {
    format!(
        "Begin the task. Start by planning your first steps and recording the plan in {}.",
        progress_file
    )
}

/// User turn that asks for the next step
pub fn continue_turn(step: usize, max_steps: usize, progress_file: &str, memory: Option<&Map<String, Value>>) -> String {
    let mut turn = format!(
        "Step {}/{}: continue the task. Update {} with your progress.",
        step, max_steps, progress_file
    );
    if let Some(memory) = memory {
        let state = serde_json::to_string(memory).unwrap_or_default();
        turn.push_str(&format!("\nCurrent internal state: {}", state));
    }
    turn
}

/// User turn carrying an externally injected message
pub fn interruption_turn(message: &str) -> String {
    format!("[INTERRUPTION] {}", message)
}
