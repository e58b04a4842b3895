//! Agent state: configuration, the session transcript and run outcomes

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use llm_core::{ChatMessage, Config};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One entry of the transcript
pub type Turn = ChatMessage;

/// Configuration for the agent loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Step ceiling
    pub max_steps: usize,
    /// Transcript size (characters) above which history is compacted
    pub char_budget: usize,
    /// Turns kept verbatim at the start of the transcript
    pub keep_head: usize,
    /// Turns kept verbatim at the end of the transcript
    pub keep_tail: usize,
    /// Concurrent tool calls per step
    pub workers: usize,
    /// Per-call tool timeout
    pub tool_timeout: Duration,
    /// Progress file name surfaced to the model
    pub progress_file: String,
    /// Transcript log, if any
    pub log_path: Option<PathBuf>,
    /// Session snapshot written after every step, if any
    pub state_path: Option<PathBuf>,
    /// Rolling memory file, if any
    pub memory_path: Option<PathBuf>,
    /// Custom system prompt preamble
    pub system_prompt: Option<String>,
    /// Whether to print step progress to the console
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            char_budget: 50_000,
            keep_head: 2,
            keep_tail: 6,
            workers: 10,
            tool_timeout: Duration::from_secs(45),
            progress_file: "progress.md".to_string(),
            log_path: None,
            state_path: None,
            memory_path: None,
            system_prompt: None,
            verbose: false,
        }
    }
}

impl AgentConfig {
    /// Build from the loaded configuration, with workspace files resolved under `root`
    pub fn from_config(config: &Config, root: &Path) -> Self {
        let ws = &config.workspace;
        let in_root = |name: &str| (!name.trim().is_empty()).then(|| root.join(name));

        Self {
            max_steps: config.agent.max_steps,
            char_budget: config.agent.char_budget,
            keep_head: config.agent.keep_head,
            keep_tail: config.agent.keep_tail,
            workers: config.tools.workers.max(1),
            tool_timeout: Duration::from_secs(config.tools.timeout_secs),
            progress_file: ws.progress_file.clone(),
            log_path: in_root(&ws.log_file),
            state_path: in_root(&ws.state_file),
            memory_path: in_root(&ws.memory_file),
            system_prompt: None,
            verbose: config.agent.echo,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[cfg(test)]
impl AgentConfig {
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_char_budget(mut self, budget: usize) -> Self {
        self.char_budget = budget;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn with_memory_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.memory_path = Some(path.into());
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalOutcome {
    /// A control signal (`finish`, `stop`, `exit`) was observed
    Completed,
    /// The step ceiling was reached
    Exhausted,
    /// The model could not be reached
    Aborted,
}

impl TerminalOutcome {
    /// Process exit code for the CLI
    pub fn exit_code(self) -> i32 {
        match self {
            TerminalOutcome::Completed => 0,
            TerminalOutcome::Aborted => 1,
            TerminalOutcome::Exhausted => 2,
        }
    }
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalOutcome::Completed => write!(f, "completed"),
            TerminalOutcome::Exhausted => write!(f, "exhausted"),
            TerminalOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Control loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    DispatchingTools,
    Compacting,
    Terminated(TerminalOutcome),
}

/// The ordered transcript plus a step counter.
///
/// Turn 0 is the system turn and turn 1 the initial user turn; both survive
/// compaction verbatim.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    turns: Vec<Turn>,
    step: usize,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turns: Vec::new(),
            step: 0,
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Sum of content lengths, in characters
    pub fn size(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn advance(&mut self) -> usize {
        self.step += 1;
        self.step
    }

    /// Replace every turn strictly between the first `keep_head` and the last
    /// `keep_tail` with one synthetic user turn, when `size() > threshold`.
    ///
    /// Returns the number of turns removed (0 when nothing happened).
    pub fn compact(&mut self, keep_head: usize, keep_tail: usize, threshold: usize, progress_file: &str) -> usize {
        let size = self.size();
        if size <= threshold || self.turns.len() <= keep_head + keep_tail {
            return 0;
        }

        let tail_start = self.turns.len() - keep_tail;
        let removed = tail_start - keep_head;
        self.turns
            .splice(keep_head..tail_start, [compaction_notice(removed, progress_file)]);

        debug!(removed, before = size, after = self.size(), "Compacted transcript");
        removed
    }

    /// Serializable view of the session
    pub fn snapshot(&self, model: &str, outcome: Option<TerminalOutcome>) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
            model: model.to_string(),
            step: self.step,
            outcome,
            turns: self.turns.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn compaction_notice(removed: usize, progress_file: &str) -> Turn {
    Turn::user(format!(
        "[CONTEXT COMPACTED] {} earlier turns were removed to stay within the context budget. \
         A summary of the work so far is kept in {}; read it if you need details from earlier steps.",
        removed, progress_file
    ))
}

/// Session state as written to disk after every step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: String,
    pub step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TerminalOutcome>,
    pub turns: Vec<Turn>,
}

impl SessionSnapshot {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize session")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write session state {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session state {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse session state {}", path.display()))
    }

    /// Rebuild a live session to continue from
    pub fn into_session(self) -> Session {
        Session {
            id: self.id,
            created_at: self.created_at,
            turns: self.turns,
            step: self.step,
        }
    }
}

/// What the caller of the loop receives
#[derive(Debug)]
pub struct RunReport {
    pub outcome: TerminalOutcome,
    /// Steps executed in this run
    pub steps: usize,
    pub session: Session,
    /// Finish message, transport error and the like
    pub detail: Option<String>,
}
