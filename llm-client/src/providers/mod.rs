//! Provider implementations

pub mod mock;
mod openai_compatible;
mod speech;

pub use mock::{MockProvider, MockSpeechProvider};
pub use openai_compatible::{Endpoint, OpenAICompatibleProvider};
pub use speech::OpenAISpeechProvider;

use std::str::FromStr;
use std::time::Duration;

use crate::config::{ModelPreset, ProviderConfig};
use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, SpeechProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_AZURE_API_VERSION: &str = "preview";

/// Generation calls can be slow for long chapters
const DEFAULT_TIMEOUT_SECS: u64 = 1200;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Azure,
    OpenRouter,
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "azure" | "azure-openai" | "azure_openai" => Ok(Self::Azure),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(LlmError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }
}

impl ProviderKind {
    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Azure => "AZURE_OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Display name used in errors and logs
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Azure => "Azure OpenAI",
            Self::OpenRouter => "OpenRouter",
        }
    }

    fn supports_speech(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Azure)
    }
}

/// Create a text provider instance from a preset and optional config
pub fn get_provider(
    preset: &ModelPreset,
    provider_config: Option<&ProviderConfig>,
) -> Result<Box<dyn LlmProvider>> {
    let kind: ProviderKind = preset.provider.parse()?;
    let api_key = get_api_key(provider_config, &[kind.env_var()], kind.display_name())?;
    let endpoint = resolve_endpoint(kind, provider_config, api_key)?;

    Ok(Box::new(OpenAICompatibleProvider::new(
        &preset.model,
        endpoint,
        kind.display_name(),
    )?))
}

/// Create a speech provider for the named provider, model and default voice
///
/// `TTS_API_KEY` takes precedence over the provider's usual key variable so
/// speech can be billed to a separate account.
pub fn get_speech_provider(
    provider: &str,
    model: &str,
    voice: &str,
    provider_config: Option<&ProviderConfig>,
) -> Result<Box<dyn SpeechProvider>> {
    let kind: ProviderKind = provider.parse()?;
    if !kind.supports_speech() {
        return Err(LlmError::ConfigError(format!(
            "{} does not offer speech synthesis",
            kind.display_name()
        )));
    }

    let api_key = get_api_key(
        provider_config,
        &["TTS_API_KEY", kind.env_var()],
        kind.display_name(),
    )?;
    let endpoint = resolve_endpoint(kind, provider_config, api_key)?;

    Ok(Box::new(OpenAISpeechProvider::new(
        model,
        voice,
        endpoint,
        kind.display_name(),
    )?))
}

fn resolve_endpoint(
    kind: ProviderKind,
    config: Option<&ProviderConfig>,
    api_key: String,
) -> Result<Endpoint> {
    let configured_url = config
        .and_then(|c| c.base_url.clone())
        .or_else(|| std::env::var("OPENAI_API_BASE").ok().filter(|_| kind != ProviderKind::OpenRouter));
    let timeout = Duration::from_secs(
        config
            .and_then(|c| c.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    );

    let endpoint = match kind {
        ProviderKind::OpenAI => Endpoint::bearer(
            configured_url.as_deref().unwrap_or(OPENAI_BASE_URL),
            api_key,
        ),
        ProviderKind::OpenRouter => Endpoint::bearer(
            config
                .and_then(|c| c.base_url.as_deref())
                .unwrap_or(OPENROUTER_BASE_URL),
            api_key,
        ),
        ProviderKind::Azure => {
            let base_url = configured_url.ok_or_else(|| {
                LlmError::ConfigError(
                    "Azure OpenAI needs a deployment base_url (or OPENAI_API_BASE)".to_string(),
                )
            })?;
            let api_version = config
                .and_then(|c| c.api_version.clone())
                .or_else(|| std::env::var("OPENAI_API_VERSION").ok())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
            Endpoint::azure(&base_url, api_key, &api_version)
        }
    };

    Ok(endpoint.with_timeout(timeout))
}

/// Get API key from config or the first environment variable that is set
fn get_api_key(
    config: Option<&ProviderConfig>,
    env_vars: &[&str],
    provider_name: &str,
) -> Result<String> {
    if let Some(key) = config.and_then(|c| c.api_key.clone()) {
        return Ok(key);
    }

    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| LlmError::MissingApiKey {
            provider: provider_name.to_string(),
            env_var: env_vars.last().copied().unwrap_or_default().to_string(),
        })
}
