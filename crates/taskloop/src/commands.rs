//! CLI commands implementation

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use llm_core::config::CONFIG_FILE_NAME;
use llm_core::{ChatClient, Config, GatewayKind};
use walkdir::WalkDir;

use crate::agent::{
    parse_log, AgentConfig, AgentLoop, FileInbox, LogSummary, SessionSnapshot, TerminalOutcome,
};
use crate::tools::builtin::create_default_registry;
use crate::tools::{BuiltinGateway, ProcessGateway, ToolContext, ToolGateway, Workspace};

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub max_steps: Option<usize>,
    pub budget: Option<usize>,
    pub workers: Option<usize>,
    pub timeout: Option<u64>,
    pub workspace: Option<PathBuf>,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(model) = self.model {
            config.model.model = model;
        }
        if let Some(endpoint) = self.endpoint {
            config.model.endpoint = endpoint;
        }
        if let Some(max_steps) = self.max_steps {
            config.agent.max_steps = max_steps;
        }
        if let Some(budget) = self.budget {
            config.agent.char_budget = budget;
        }
        if let Some(workers) = self.workers {
            config.tools.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.tools.timeout_secs = timeout;
        }
        if let Some(root) = self.workspace {
            config.workspace.root = root;
        }
    }
}

fn print_status(ok: bool, msg: &str) {
    let icon = if ok {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!("  {} {}", icon, msg);
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Configuration with the `--workspace` override applied
fn load_workspace_config(path: Option<&Path>, workspace: Option<PathBuf>) -> Result<Config> {
    let mut config = load_config(path)?;
    if let Some(root) = workspace {
        config.workspace.root = root;
    }
    Ok(config)
}

/// Task text from the arguments, else `--task-file`, else the workspace task file
fn resolve_task(words: Vec<String>, task_file: Option<PathBuf>, config: &Config, root: &Path) -> Result<String> {
    let task = if !words.is_empty() {
        words.join(" ")
    } else {
        let path = task_file.unwrap_or_else(|| root.join(&config.workspace.task_file));
        fs::read_to_string(&path)
            .with_context(|| format!("No task given and failed to read {}", path.display()))?
    };

    if task.trim().is_empty() {
        bail!("Task is empty");
    }
    Ok(task)
}

fn build_gateway(config: &Config, workspace: Workspace) -> Result<Arc<dyn ToolGateway>> {
    let tools = &config.tools;
    let gateway: Arc<dyn ToolGateway> = match tools.gateway {
        GatewayKind::Builtin => {
            let ctx = ToolContext::new(workspace)
                .with_max_output_len(tools.max_output_chars)
                .with_search_endpoint(Some(tools.search_endpoint.clone()))
                .with_fetch_endpoint(Some(tools.fetch_endpoint.clone()));
            Arc::new(BuiltinGateway::new(create_default_registry(), ctx))
        }
        GatewayKind::Process => Arc::new(
            ProcessGateway::new(tools.program.clone(), workspace.root().to_path_buf())?
                .with_max_output_len(tools.max_output_chars),
        ),
    };
    Ok(gateway)
}

/// Run the agent loop; returns the process exit code
pub async fn run(
    config_path: Option<&Path>,
    task: Vec<String>,
    task_file: Option<PathBuf>,
    resume: bool,
    overrides: RunOverrides,
) -> Result<i32> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config);

    let workspace = Workspace::open(&config.workspace.root)?;
    let root = workspace.root().to_path_buf();
    let task = resolve_task(task, task_file, &config, &root)?;

    let mut agent_config = AgentConfig::from_config(&config, &root);
    let prompt_file = config.workspace.system_prompt_file.trim();
    if !prompt_file.is_empty() {
        let path = root.join(prompt_file);
        let preamble = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read system prompt {}", path.display()))?;
        agent_config = agent_config.with_system_prompt(preamble);
    }

    let session = if resume {
        let path = agent_config
            .state_path
            .clone()
            .context("Cannot resume: no state file configured")?;
        Some(SessionSnapshot::load(&path)?.into_session())
    } else {
        None
    };

    let gateway = build_gateway(&config, workspace)?;
    let model = ChatClient::new(&config.model, config.api_key())?;
    let inbox = FileInbox::new(root.join(&config.workspace.inbox_file));

    if agent_config.verbose {
        println!("{}Agent Mode{}", BOLD, RESET);
        println!("{}Model: {}{}", DIM, config.model.model, RESET);
        println!("{}Workspace: {}{}", DIM, root.display(), RESET);
        println!(
            "{}Steps: {}  Workers: {}  Tool timeout: {}s{}",
            DIM,
            agent_config.max_steps,
            agent_config.workers,
            agent_config.tool_timeout.as_secs(),
            RESET
        );
        println!(
            "{}Interrupt with: taskloop interrupt <message>{}",
            DIM, RESET
        );
        println!();
    }

    let agent = AgentLoop::new(Arc::new(model), gateway, Arc::new(inbox), agent_config, root);
    let report = match session {
        Some(session) => {
            println!("{}Resuming session {} at step {}{}", BLUE, session.id, session.step(), RESET);
            agent.run_session(session, &task).await
        }
        None => agent.run(&task).await,
    };

    let color = match report.outcome {
        TerminalOutcome::Completed => GREEN,
        TerminalOutcome::Exhausted => YELLOW,
        TerminalOutcome::Aborted => RED,
    };
    println!(
        "{}{}{} after {} steps ({} turns in transcript)",
        color,
        report.outcome,
        RESET,
        report.steps,
        report.session.len()
    );
    if let Some(detail) = &report.detail {
        println!("{}", detail);
    }

    Ok(report.outcome.exit_code())
}

/// Bootstrap a workspace directory with a task, optional knowledge base and system prompt
pub fn init(dir: &Path, task: &str, kb: Option<&Path>, system: Option<&Path>) -> Result<()> {
    if task.trim().is_empty() {
        bail!("Task is empty");
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    println!("{}Workspace:{} {}", BOLD, RESET, dir.display());

    let task_path = dir.join("task.md");
    fs::write(&task_path, format!("# Task Assignment\n\n{}", task.trim()))
        .with_context(|| format!("Failed to write {}", task_path.display()))?;
    print_status(true, "task.md");

    if let Some(kb) = kb {
        let copied = copy_tree(kb, &dir.join("kb"))?;
        print_status(true, &format!("kb/ ({} files)", copied));
    }

    if let Some(system) = system {
        let target = dir.join("custom_system_prompt.txt");
        fs::copy(system, &target)
            .with_context(|| format!("Failed to copy system prompt {}", system.display()))?;
        print_status(true, "custom_system_prompt.txt");
        println!(
            "{}Set workspace.system_prompt_file = \"custom_system_prompt.txt\" to use it.{}",
            DIM, RESET
        );
    }

    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    if !source.is_dir() {
        bail!("Knowledge base {} is not a directory", source.display());
    }

    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("Unexpected path {}", entry.path().display()))?;
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).with_context(|| format!("Failed to create {}", dest.display()))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Post a message into the running loop's inbox
pub fn interrupt(config_path: Option<&Path>, workspace: Option<PathBuf>, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Message is empty");
    }

    let config = load_workspace_config(config_path, workspace)?;
    let inbox = FileInbox::new(config.workspace_path(&config.workspace.inbox_file));
    inbox.post(message)?;

    println!("{}Queued:{} {}", GREEN, RESET, inbox.path().display());
    Ok(())
}

/// Summarise a transcript log
pub fn log(config_path: Option<&Path>, workspace: Option<PathBuf>, path: Option<PathBuf>, json: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            let config = load_workspace_config(config_path, workspace)?;
            config.workspace_path(&config.workspace.log_file)
        }
    };

    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read log {}", path.display()))?;
    let events = parse_log(&text);
    let summary = LogSummary::from_events(&events);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}Session log:{} {}", BOLD, RESET, path.display());
        println!("{}{} events{}", DIM, events.len(), RESET);
        println!();
        println!("{}", summary);
    }

    Ok(())
}

/// Write a commented default configuration file in the current directory
pub fn config_init(force: bool) -> Result<()> {
    let path = std::env::current_dir()?.join(CONFIG_FILE_NAME);

    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use 'taskloop config init --force' to overwrite it.");
        return Ok(());
    }

    fs::write(&path, Config::default_file_contents())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}Created:{} {}", GREEN, RESET, path.display());
    println!("\nEdit this file to customize taskloop.");
    Ok(())
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&Path>, workspace: Option<PathBuf>) -> Result<()> {
    let source = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => Config::find_config_path()
            .ok()
            .or_else(|| Config::user_config_path().filter(|p| p.exists())),
    };
    let config = load_workspace_config(config_path, workspace)?;

    println!("{}Configuration{}", BOLD, RESET);
    match source {
        Some(path) => println!("  Path: {}", path.display()),
        None => println!("  Path: (defaults)"),
    }
    if config.api_key().is_some() {
        print_status(true, &format!("API key found ({})", config.model.api_key_env));
    } else {
        print_status(false, &format!("No API key ({} unset)", config.model.api_key_env));
    }
    println!();
    println!("{}", config.to_redacted_toml()?);

    Ok(())
}
