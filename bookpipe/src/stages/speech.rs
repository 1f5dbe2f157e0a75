//! Speech synthesis call.

use anyhow::Context;
use async_trait::async_trait;
use llm_client::{LlmError, SpeechProvider, SpeechRequest};
use std::sync::Arc;

use crate::runner::ChunkCall;
use crate::text::Chunk;

/// Synthesizes each chunk into encoded audio.
pub struct SpeechCall {
    provider: Arc<dyn SpeechProvider>,
    voice: Option<String>,
}

impl SpeechCall {
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        Self {
            provider,
            voice: None,
        }
    }

    /// Use `voice` instead of the provider's default.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

#[async_trait]
impl ChunkCall for SpeechCall {
    type Output = Vec<u8>;

    fn label(&self) -> &str {
        "speak"
    }

    async fn call(&self, chunk: &Chunk) -> anyhow::Result<Vec<u8>> {
        let mut request = SpeechRequest::new(chunk.text.as_str());
        request.voice = self.voice.clone();

        let audio = self
            .provider
            .synthesize(request)
            .await
            .with_context(|| format!("{} speech request failed", self.provider.name()))?;

        if audio.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.provider.name().to_string(),
            }
            .into());
        }
        Ok(audio)
    }
}
