//! Configuration management for taskloop.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name searched for in the current directory and its parents
pub const CONFIG_FILE_NAME: &str = "taskloop.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Model endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inline API key, used when the environment variable is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Ask the endpoint for a JSON object response
    #[serde(default = "default_true")]
    pub json_mode: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Control loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Step ceiling
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Transcript size (characters) above which history is compacted
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,
    #[serde(default = "default_keep_head")]
    pub keep_head: usize,
    #[serde(default = "default_keep_tail")]
    pub keep_tail: usize,
    /// Print step progress to stdout
    #[serde(default = "default_true")]
    pub echo: bool,
}

/// Which tool gateway to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// In-process built-in tools
    #[default]
    Builtin,
    /// External tool program
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub gateway: GatewayKind,
    /// Command line of the external tool program (process gateway)
    #[serde(default = "default_program")]
    pub program: Vec<String>,
    /// Concurrency cap for one step's tool calls
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-call timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// Search service queried with `?q=&num_results=`; DuckDuckGo when empty
    #[serde(default)]
    pub search_endpoint: String,
    /// Fetch service receiving `{url, extract_mode, max_chars}`; direct GET when empty
    #[serde(default)]
    pub fetch_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_task_file")]
    pub task_file: String,
    #[serde(default = "default_progress_file")]
    pub progress_file: String,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_memory_file")]
    pub memory_file: String,
    #[serde(default = "default_inbox_file")]
    pub inbox_file: String,
    /// Optional file replacing the built-in system prompt preamble
    #[serde(default)]
    pub system_prompt_file: String,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "TASKLOOP_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_steps() -> usize {
    50
}

fn default_char_budget() -> usize {
    50_000
}

fn default_keep_head() -> usize {
    2
}

fn default_keep_tail() -> usize {
    6
}

fn default_program() -> Vec<String> {
    vec!["python3".to_string(), "use_tools.py".to_string()]
}

fn default_workers() -> usize {
    10
}

fn default_tool_timeout() -> u64 {
    45
}

fn default_max_output_chars() -> usize {
    20_000
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_task_file() -> String {
    "task.md".to_string()
}

fn default_progress_file() -> String {
    "progress.md".to_string()
}

fn default_log_file() -> String {
    "session_log.txt".to_string()
}

fn default_state_file() -> String {
    "session_state.json".to_string()
}

fn default_memory_file() -> String {
    "rolling_memory.json".to_string()
}

fn default_inbox_file() -> String {
    "interrupt.txt".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            temperature: default_temperature(),
            json_mode: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            char_budget: default_char_budget(),
            keep_head: default_keep_head(),
            keep_tail: default_keep_tail(),
            echo: true,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayKind::default(),
            program: default_program(),
            workers: default_workers(),
            timeout_secs: default_tool_timeout(),
            max_output_chars: default_max_output_chars(),
            search_endpoint: String::new(),
            fetch_endpoint: String::new(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            task_file: default_task_file(),
            progress_file: default_progress_file(),
            log_file: default_log_file(),
            state_file: default_state_file(),
            memory_file: default_memory_file(),
            inbox_file: default_inbox_file(),
            system_prompt_file: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from taskloop.toml, falling back to the user config
    /// directory and finally to defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = Self::find_config_path() {
            return Self::load_from(path);
        }

        if let Some(path) = Self::user_config_path().filter(|p| p.exists()) {
            return Self::load_from(path);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find taskloop.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Per-user configuration file (~/.config/taskloop/config.toml or platform equivalent)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("taskloop").join("config.toml"))
    }

    /// Resolve the API key: environment variable first, then inline value
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.model.api_key.clone().filter(|k| !k.trim().is_empty()))
    }

    /// Resolve a workspace-relative file name against the workspace root
    pub fn workspace_path(&self, name: &str) -> PathBuf {
        self.workspace.root.join(name)
    }

    /// Render as TOML with the inline API key redacted
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.model.api_key.is_some() {
            shown.model.api_key = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown).context("Failed to serialize configuration")
    }

    /// Commented default configuration file
    pub fn default_file_contents() -> &'static str {
        DEFAULT_CONFIG_TOML
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# taskloop configuration

[model]
# OpenAI-compatible base URL
endpoint = "https://api.openai.com/v1"
model = "gpt-4o-mini"
# Environment variable holding the API key
api_key_env = "TASKLOOP_API_KEY"
temperature = 0.2
# Request a JSON object response (response_format)
json_mode = true
request_timeout_secs = 300

[agent]
# Step ceiling
max_steps = 50
# Transcript size in characters that triggers compaction
char_budget = 50000
keep_head = 2
keep_tail = 6
# Print step progress to stdout
echo = true

[tools]
# "builtin" or "process"
gateway = "builtin"
# External tool program for the process gateway
program = ["python3", "use_tools.py"]
workers = 10
timeout_secs = 45
max_output_chars = 20000
# Optional search/fetch services; empty means direct access
search_endpoint = ""
fetch_endpoint = ""

[workspace]
root = "."
task_file = "task.md"
progress_file = "progress.md"
log_file = "session_log.txt"
state_file = "session_state.json"
memory_file = "rolling_memory.json"
inbox_file = "interrupt.txt"
# system_prompt_file = "custom_system_prompt.txt"
"#;
