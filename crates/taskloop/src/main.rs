//! taskloop: autonomous task-execution loop for language-model-directed agents
//!
//! The model works through a task in bounded steps, answering with a JSON
//! action contract whose tool calls run concurrently inside a workspace.

mod agent;
mod commands;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::RunOverrides;

#[derive(Debug, Parser)]
#[command(name = "taskloop")]
#[command(about = "Autonomous task-execution loop for language-model-directed agents", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to taskloop.toml in this or a parent directory)
    #[arg(short, long, global = true, env = "TASKLOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace root directory (overrides workspace.root)
    #[arg(short, long, global = true, env = "TASKLOOP_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the agent loop on a task
    Run {
        /// Task text (defaults to --task-file, then the workspace task file)
        task: Vec<String>,

        /// Read the task from a file
        #[arg(long)]
        task_file: Option<PathBuf>,

        /// Continue from the saved session snapshot
        #[arg(long)]
        resume: bool,

        /// Model name
        #[arg(short, long, env = "TASKLOOP_MODEL")]
        model: Option<String>,

        /// OpenAI-compatible base URL
        #[arg(long, env = "TASKLOOP_ENDPOINT")]
        endpoint: Option<String>,

        /// Step ceiling
        #[arg(long, env = "TASKLOOP_MAX_STEPS")]
        max_steps: Option<usize>,

        /// Transcript character budget before compaction
        #[arg(long, env = "TASKLOOP_BUDGET")]
        budget: Option<usize>,

        /// Concurrent tool calls per step
        #[arg(long, env = "TASKLOOP_WORKERS")]
        workers: Option<usize>,

        /// Per-call tool timeout in seconds
        #[arg(long, env = "TASKLOOP_TIMEOUT")]
        timeout: Option<u64>,
    },

    /// Bootstrap a workspace directory
    Init {
        /// Workspace directory to create
        dir: PathBuf,

        /// Task text written to task.md
        #[arg(short, long)]
        task: String,

        /// Knowledge-base directory copied into kb/
        #[arg(long)]
        kb: Option<PathBuf>,

        /// Custom system prompt file
        #[arg(long)]
        system: Option<PathBuf>,
    },

    /// Send a message to a running loop
    Interrupt {
        /// Message text
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Summarise a transcript log
    Log {
        /// Log file (defaults to the workspace log)
        path: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a default taskloop.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            task,
            task_file,
            resume,
            model,
            endpoint,
            max_steps,
            budget,
            workers,
            timeout,
        } => {
            let overrides = RunOverrides {
                model,
                endpoint,
                max_steps,
                budget,
                workers,
                timeout,
                workspace: cli.workspace,
            };
            let code = commands::run(config_path, task, task_file, resume, overrides).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Init { dir, task, kb, system } => {
            commands::init(&dir, &task, kb.as_deref(), system.as_deref())
        }
        Commands::Interrupt { message } => {
            commands::interrupt(config_path, cli.workspace, &message.join(" "))
        }
        Commands::Log { path, json } => commands::log(config_path, cli.workspace, path, json),
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config_init(force),
            ConfigAction::Show => commands::config_show(config_path, cli.workspace),
        },
    }
}
