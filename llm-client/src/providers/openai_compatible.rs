//! OpenAI-compatible API provider
//!
//! Used for services that implement the OpenAI chat completions API:
//! - OpenAI
//! - Azure OpenAI deployments
//! - OpenRouter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};

/// How requests authenticate against the service
#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    /// Azure uses an `api-key` header instead of a bearer token
    ApiKeyHeader(String),
}

/// Base URL, credentials and transport settings shared by chat and speech calls
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: String,
    auth: Auth,
    api_version: Option<String>,
    timeout: Duration,
}

impl Endpoint {
    pub fn bearer(base_url: &str, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: Auth::Bearer(api_key),
            api_version: None,
            timeout: Duration::from_secs(1200),
        }
    }

    pub fn azure(base_url: &str, api_key: String, api_version: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: Auth::ApiKeyHeader(api_key),
            api_version: Some(api_version.to_string()),
            timeout: Duration::from_secs(1200),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full URL for an API path such as `chat/completions`
    pub fn url(&self, path: &str) -> String {
        match &self.api_version {
            Some(version) => format!("{}/{}?api-version={}", self.base_url, path, version),
            None => format!("{}/{}", self.base_url, path),
        }
    }

    pub(crate) fn client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to build HTTP client: {}", e)))
    }

    pub(crate) fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(key) => builder.header("Authorization", format!("Bearer {}", key)),
            Auth::ApiKeyHeader(key) => builder.header("api-key", key),
        }
    }

    /// Send a prepared request, mapping transport errors
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.authorize(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                LlmError::ApiError {
                    message: format!("Request failed: {}", e),
                    status_code: None,
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let error_text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
            Ok(error_response) => error_response.error.message,
            Err(_) => error_text,
        };

        Err(match status.as_u16() {
            429 => LlmError::RateLimited { retry_after },
            503 => LlmError::ServerOverloaded { message },
            code => LlmError::ApiError {
                message,
                status_code: Some(code),
            },
        })
    }
}

/// Provider for OpenAI-compatible chat completion APIs
pub struct OpenAICompatibleProvider {
    model: String,
    endpoint: Endpoint,
    name: &'static str,
    client: Client,
}

impl OpenAICompatibleProvider {
    /// Create a new OpenAI-compatible provider
    pub fn new(model: &str, endpoint: Endpoint, name: &'static str) -> Result<Self> {
        let client = endpoint.client()?;

        Ok(Self {
            model: model.to_string(),
            endpoint,
            name,
            client,
        })
    }
}

// OpenAI API request/response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn build_chat_request(model: &str, request: LlmRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(system) = request.system_prompt {
        messages.push(Message {
            role: "system",
            content: system,
        });
    }

    messages.push(Message {
        role: "user",
        content: request.prompt,
    });

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

#[async_trait]
impl LlmProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let chat_request = build_chat_request(&self.model, request);
        let url = self.endpoint.url("chat/completions");
        log::debug!("POST {} (model {})", url, self.model);

        let response = self
            .endpoint
            .send(self.client.post(&url).json(&chat_request))
            .await?;

        let chat_response: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::ApiError {
                message: format!("Failed to parse response: {}", e),
                status_code: None,
            })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.name.to_string(),
            });
        }

        let usage = chat_response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage,
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
