//! Generation-service client library for the bookpipe workspace
//!
//! Provides two provider families behind async traits:
//! - Text completion (OpenAI, Azure OpenAI, OpenRouter chat completions)
//! - Speech synthesis (OpenAI / Azure OpenAI audio speech)
//!
//! Mock implementations of both are exported for tests.

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::{Config, ModelPreset, ProviderConfig};
pub use error::{LlmError, Result};
pub use provider::{
    LlmProvider, LlmRequest, LlmResponse, SpeechProvider, SpeechRequest, TokenUsage,
};
pub use providers::{
    MockProvider, MockSpeechProvider, ProviderKind, get_provider, get_speech_provider,
};
