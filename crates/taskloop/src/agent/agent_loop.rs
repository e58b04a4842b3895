//! The control loop: prompt, model, contract, dispatch, compaction, termination

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use llm_core::ChatModel;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::tools::ToolGateway;

use super::contract::{parse_reply, Action, AgentReply};
use super::dispatcher::{Dispatcher, StepBatch};
use super::interrupt::Inbox;
use super::prompt::{continue_turn, initial_turn, interruption_turn, SystemPrompt};
use super::state::{AgentConfig, LoopState, RunReport, Session, TerminalOutcome, Turn};
use super::transcript::{Label, TranscriptLog};

// ANSI colors
const GREEN: &str = "\x1b[92m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// The agent loop orchestrator
pub struct AgentLoop {
    model: Arc<dyn ChatModel>,
    gateway: Arc<dyn ToolGateway>,
    inbox: Arc<dyn Inbox>,
    dispatcher: Dispatcher,
    config: AgentConfig,
    workspace_root: PathBuf,
    log: Option<TranscriptLog>,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        gateway: Arc<dyn ToolGateway>,
        inbox: Arc<dyn Inbox>,
        config: AgentConfig,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&gateway), config.workers, config.tool_timeout);
        let log = config.log_path.clone().map(TranscriptLog::new);

        Self {
            model,
            gateway,
            inbox,
            dispatcher,
            config,
            workspace_root: workspace_root.into(),
            log,
        }
    }

    /// Run a fresh session for `task`
    pub async fn run(&self, task: &str) -> RunReport {
        self.run_session(Session::new(), task).await
    }

    /// Continue an existing session; an empty session starts from scratch
    #[instrument(skip(self, session, task), fields(model = %self.model.model_name(), session = %session.id))]
    pub async fn run_session(&self, mut session: Session, task: &str) -> RunReport {
        info!(
            task_len = task.len(),
            max_steps = self.config.max_steps,
            budget = self.config.char_budget,
            "Starting agent loop"
        );

        let fresh = session.is_empty();
        if fresh {
            session.append(Turn::system(self.system_prompt(task)));
            session.append(Turn::user(initial_turn(&self.config.progress_file)));
        }

        let mut memory = self.load_memory();
        let mut state = LoopState::AwaitingModel;
        let mut steps = 0;
        let mut outcome = TerminalOutcome::Exhausted;
        let mut detail = None;

        while steps < self.config.max_steps {
            steps += 1;
            let total_step = session.advance();
            debug!(step = steps, total_step, turns = session.len(), size = session.size(), "Starting step");

            if self.config.verbose {
                println!("{}[Step {}/{}]{}", DIM, steps, self.config.max_steps, RESET);
            }

            // Prompt for this step
            let input_start = if fresh && steps == 1 { 0 } else { session.len() };
            self.check_inbox(&mut session);
            if !(fresh && steps == 1) {
                session.append(Turn::user(continue_turn(
                    steps,
                    self.config.max_steps,
                    &self.config.progress_file,
                    memory.as_ref(),
                )));
            }
            self.record(Label::LlmInput, &render_turns(&session.turns()[input_start..]));

            // Model
            transition(&mut state, LoopState::AwaitingModel);
            let raw = match self.model.complete(session.turns()).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(category = "transport", error = %e, step = steps, "Model call failed");
                    if self.config.verbose {
                        println!("{}LLM error: {}{}", YELLOW, e, RESET);
                    }
                    outcome = TerminalOutcome::Aborted;
                    detail = Some(format!("{:#}", e));
                    break;
                }
            };
            self.record(Label::LlmResponse, &raw);
            if !raw.trim().is_empty() {
                session.append(Turn::assistant(raw.clone()));
            }

            // Contract
            let reply = match parse_reply(&raw) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(category = "contract", error = %e, step = steps, "Rejected model response");
                    self.record(Label::ContractError, &e.to_string());
                    if self.config.verbose {
                        println!("{}Invalid response: {}{}", YELLOW, e, RESET);
                    }
                    session.append(Turn::user(e.corrective_text()));
                    self.finish_step(&mut session, &mut state);
                    continue;
                }
            };
            self.note_reply(&reply, &mut memory);

            // Tools
            let batch = if reply.tool_calls.is_empty() {
                debug!(step = steps, "No tool calls this step");
                StepBatch::default()
            } else {
                transition(&mut state, LoopState::DispatchingTools);
                let batch = self.dispatch(&reply.tool_calls).await;
                session.append(Turn::user(batch.merged_turn()));
                batch
            };

            self.finish_step(&mut session, &mut state);

            if let Some(signal) = batch.control_signal() {
                info!(tool = %signal.tool_name, step = steps, "Control signal observed");
                outcome = TerminalOutcome::Completed;
                detail = Some(signal.text.clone());
                break;
            }
        }

        transition(&mut state, LoopState::Terminated(outcome));
        let summary = match &detail {
            Some(d) => format!("{} after {} steps: {}", outcome, steps, d),
            None => format!("{} after {} steps", outcome, steps),
        };
        self.record(Label::Terminated, &summary);
        self.save_snapshot(&session, Some(outcome));
        info!(%outcome, steps, turns = session.len(), "Agent loop finished");

        if self.config.verbose {
            let color = if outcome == TerminalOutcome::Completed { GREEN } else { YELLOW };
            println!("\n{}Session {}{}", color, summary, RESET);
        }

        RunReport {
            outcome,
            steps,
            session,
            detail,
        }
    }

    fn system_prompt(&self, task: &str) -> String {
        SystemPrompt {
            preamble: self.config.system_prompt.as_deref(),
            workspace_root: &self.workspace_root,
            tool_list: &self.gateway.describe_tools(),
            progress_file: &self.config.progress_file,
            task,
        }
        .render()
    }

    /// Inject a pending interruption as its own turn
    fn check_inbox(&self, session: &mut Session) {
        match self.inbox.take() {
            Ok(Some(message)) => {
                info!(len = message.len(), "Interruption received");
                self.record(Label::Interruption, &message);
                if self.config.verbose {
                    println!("{}[INTERRUPTION] {}{}", BLUE, message, RESET);
                }
                session.append(Turn::user(interruption_turn(&message)));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read interruption inbox"),
        }
    }

    fn note_reply(&self, reply: &AgentReply, memory: &mut Option<Map<String, Value>>) {
        self.record(Label::Thought, &reply.thought);
        if self.config.verbose && !reply.thought.is_empty() {
            println!("{}{}{}", CYAN, reply.thought, RESET);
        }

        if let Some(update) = &reply.memory_update {
            debug!(keys = update.len(), "Memory updated");
            self.persist_memory(update);
            *memory = Some(update.clone());
        }
    }

    async fn dispatch(&self, calls: &[Action]) -> StepBatch {
        for call in calls {
            self.record(Label::ToolCall, &call.to_string());
            if self.config.verbose {
                println!("{}→ {}{}", YELLOW, call, RESET);
            }
        }

        let batch = self.dispatcher.dispatch(calls).await;

        for obs in &batch.observations {
            let status = if obs.is_error { "error" } else { "ok" };
            self.record(
                Label::ToolResult,
                &format!("{} [{}] (status {})\n{}", obs.tool_name, status, obs.exit_status, obs.text),
            );
            if self.config.verbose {
                let color = if obs.is_error { YELLOW } else { GREEN };
                println!("{}✓ {} [{}]{}", color, obs.tool_name, status, RESET);
            }
        }
        self.record(
            Label::Observation,
            &format!("{} tool calls, {} errors", batch.observations.len(), batch.error_count()),
        );

        batch
    }

    /// Compaction and the per-step snapshot
    fn finish_step(&self, session: &mut Session, state: &mut LoopState) {
        let size = session.size();
        if size > self.config.char_budget {
            transition(state, LoopState::Compacting);
            let removed = session.compact(
                self.config.keep_head,
                self.config.keep_tail,
                self.config.char_budget,
                &self.config.progress_file,
            );
            if removed > 0 {
                info!(removed, before = size, after = session.size(), "Context budget exceeded, compacted transcript");
                self.record(
                    Label::Compaction,
                    &format!("removed {} turns ({} -> {} chars)", removed, size, session.size()),
                );
            }
        }

        self.save_snapshot(session, None);
        transition(state, LoopState::AwaitingModel);
    }

    fn record(&self, label: Label, content: &str) {
        if let Some(log) = &self.log {
            log.record(label, content);
        }
    }

    fn save_snapshot(&self, session: &Session, outcome: Option<TerminalOutcome>) {
        let Some(path) = &self.config.state_path else {
            return;
        };
        if let Err(e) = session.snapshot(self.model.model_name(), outcome).save(path) {
            warn!(error = %e, "Failed to save session state");
        }
    }

    fn load_memory(&self) -> Option<Map<String, Value>> {
        let path = self.config.memory_path.as_deref()?;
        if !path.exists() {
            return None;
        }
        match read_memory(path) {
            Ok(memory) => memory,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable memory file");
                None
            }
        }
    }

    fn persist_memory(&self, memory: &Map<String, Value>) {
        let Some(path) = &self.config.memory_path else {
            return;
        };
        let result = serde_json::to_string_pretty(memory)
            .map_err(anyhow::Error::from)
            .and_then(|json| fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write memory file");
        }
    }
}

fn read_memory(path: &Path) -> anyhow::Result<Option<Map<String, Value>>> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Ok(None),
    }
}

fn transition(state: &mut LoopState, next: LoopState) {
    if *state != next {
        debug!(from = ?state, to = ?next, "Loop state transition");
        *state = next;
    }
}

fn render_turns(turns: &[Turn]) -> String {
    serde_json::to_string_pretty(turns).unwrap_or_default()
}
