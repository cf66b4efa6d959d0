//! Talos LLM - Provider Abstraction
//!
//! This crate provides the language-model integration layer for the Talos
//! host runtime:
//! - Message and completion types shared by every provider
//! - The `Provider` trait (completion + tool-call extraction)
//! - OpenAI: an OpenAI-compatible chat-completions provider
//! - Mock: a queued provider for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod tools;

mod util;

pub use completion::{CompletionRequest, ProviderResponse, TokenUsage};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};
pub use mock::MockProvider;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::Provider;
pub use tools::{ToolCall, ToolDefinition};
