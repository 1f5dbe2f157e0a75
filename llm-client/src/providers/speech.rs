//! OpenAI audio speech provider (also served by Azure OpenAI deployments)

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::openai_compatible::Endpoint;
use crate::error::{LlmError, Result};
use crate::provider::{SpeechProvider, SpeechRequest};

pub struct OpenAISpeechProvider {
    model: String,
    voice: String,
    endpoint: Endpoint,
    name: &'static str,
    client: Client,
}

impl OpenAISpeechProvider {
    pub fn new(model: &str, voice: &str, endpoint: Endpoint, name: &'static str) -> Result<Self> {
        let client = endpoint.client()?;

        Ok(Self {
            model: model.to_string(),
            voice: voice.to_string(),
            endpoint,
            name,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[async_trait]
impl SpeechProvider for OpenAISpeechProvider {
    async fn synthesize(&self, request: SpeechRequest) -> Result<Vec<u8>> {
        let body = SpeechBody {
            model: &self.model,
            voice: request.voice.as_deref().unwrap_or(&self.voice),
            input: &request.input,
        };
        let url = self.endpoint.url("audio/speech");
        log::debug!(
            "POST {} (model {}, {} chars)",
            url,
            self.model,
            request.input.chars().count()
        );

        let response = self
            .endpoint
            .send(self.client.post(&url).json(&body))
            .await?;

        let bytes = response.bytes().await.map_err(|e| LlmError::ApiError {
            message: format!("Failed to read audio body: {}", e),
            status_code: None,
        })?;

        if bytes.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.name.to_string(),
            });
        }

        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
