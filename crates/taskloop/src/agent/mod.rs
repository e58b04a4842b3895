//! Agent framework for autonomous task execution
//!
//! A bounded observe-think-act loop: the model answers with a JSON action
//! contract, tool calls run concurrently through a gateway, and the transcript
//! is compacted to stay within a character budget.

mod agent_loop;
pub mod contract;
pub mod dispatcher;
pub mod interrupt;
pub mod prompt;
mod state;
pub mod transcript;

pub use agent_loop::AgentLoop;
pub use interrupt::FileInbox;
pub use state::{AgentConfig, SessionSnapshot, TerminalOutcome};
pub use transcript::{parse_log, LogSummary};
