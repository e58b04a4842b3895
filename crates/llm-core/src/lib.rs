//! llm-core: shared library for the taskloop agent
//!
//! Provides:
//! - Configuration loading (taskloop.toml)
//! - Chat-completion client for OpenAI-compatible endpoints

pub mod client;
pub mod config;

pub use client::{ChatClient, ChatMessage, ChatModel, Role};
pub use config::{AgentSettings, Config, GatewayKind, ModelConfig, ToolsConfig, WorkspaceConfig};
