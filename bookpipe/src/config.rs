//! bookpipe configuration management.
//!
//! Settings live in `~/.config/cli-programs/bookpipe.toml`; every field has a
//! default so an empty or missing file is valid. A few environment variables
//! override the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::runner::FailurePolicy;
use crate::stages::{Sampling, Stage};
use crate::text::{SegmentOptions, DEFAULT_SPLIT_FLOOR};

const DEFAULT_TARGET_LANGUAGE: &str = "Chinese (Simplified)";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 16000;
const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 2000;

/// Errors loading, saving or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// What translation writes in place of a chunk that could not be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslateFallback {
    /// The English source chunk
    #[default]
    KeepInput,
    /// A `[translate failed for chunk i]` marker
    Marker,
}

/// Speech synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Provider name as understood by llm-client (openai, azure)
    #[serde(default = "default_speech_provider")]
    pub provider: String,

    #[serde(default = "default_speech_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Extension of the audio files the provider returns
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_speech_provider() -> String {
    "openai".to_string()
}

fn default_speech_model() -> String {
    "tts-1-hd".to_string()
}

fn default_voice() -> String {
    "nova".to_string()
}

fn default_extension() -> String {
    "mp3".to_string()
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            model: default_speech_model(),
            voice: default_voice(),
            extension: default_extension(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// llm-client preset for text stages; the `bookpipe` default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_preset: Option<String>,

    /// Preset for summaries only; falls back to `model_preset`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model_preset: Option<String>,

    /// Language translations are written in
    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Response token limit for cleanup and translation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    #[serde(default = "default_clean_chunk_chars")]
    pub clean_chunk_chars: usize,

    #[serde(default = "default_translate_chunk_chars")]
    pub translate_chunk_chars: usize,

    #[serde(default = "default_speech_chunk_chars")]
    pub speech_chunk_chars: usize,

    /// Leading chars of a chapter the summary is based on
    #[serde(default = "default_summary_input_chars")]
    pub summary_input_chars: usize,

    #[serde(default = "default_text_calls_per_minute")]
    pub text_calls_per_minute: u32,

    #[serde(default = "default_speech_calls_per_minute")]
    pub speech_calls_per_minute: u32,

    /// Attempts per chunk before giving up on it
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry sleeps are `backoff_base ^ attempt` seconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Shortest acceptable soft cut, as a fraction of the chunk limit
    #[serde(default = "default_split_floor")]
    pub split_floor: f64,

    #[serde(default)]
    pub translate_on_exhausted: TranslateFallback,

    #[serde(default)]
    pub speech: SpeechSettings,
}

fn default_target_language() -> String {
    DEFAULT_TARGET_LANGUAGE.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_summary_max_tokens() -> u32 {
    DEFAULT_SUMMARY_MAX_TOKENS
}

fn default_clean_chunk_chars() -> usize {
    8000
}

fn default_translate_chunk_chars() -> usize {
    3000
}

fn default_speech_chunk_chars() -> usize {
    4000
}

fn default_summary_input_chars() -> usize {
    3000
}

fn default_text_calls_per_minute() -> u32 {
    60
}

fn default_speech_calls_per_minute() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    crate::pacing::DEFAULT_BACKOFF_BASE
}

fn default_split_floor() -> f64 {
    DEFAULT_SPLIT_FLOOR
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_preset: None,
            summary_model_preset: None,
            target_language: default_target_language(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
            clean_chunk_chars: default_clean_chunk_chars(),
            translate_chunk_chars: default_translate_chunk_chars(),
            speech_chunk_chars: default_speech_chunk_chars(),
            summary_input_chars: default_summary_input_chars(),
            text_calls_per_minute: default_text_calls_per_minute(),
            speech_calls_per_minute: default_speech_calls_per_minute(),
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            split_floor: default_split_floor(),
            translate_on_exhausted: TranslateFallback::default(),
            speech: SpeechSettings::default(),
        }
    }
}

/// Parse an environment value into `target`, naming the variable on failure.
fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(name) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
        })?;
    }
    Ok(())
}

impl PipelineConfig {
    /// Get the config file path: ~/.config/cli-programs/bookpipe.toml
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".config").join("cli-programs").join("bookpipe.toml"))
    }

    /// Load config from the default path, returning defaults if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_error)?;
        Ok(())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Recognised: `TTS_QPM`, `MAX_RETRIES`, `TEMPERATURE`,
    /// `PREPROCESS_CHUNK_SIZE`, `TTS_MODEL`, `TTS_VOICE`, and the preset names
    /// `TRANSLATION_MODEL` and `SUMMARY_MODEL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        parse_env(&lookup, "TTS_QPM", &mut self.speech_calls_per_minute)?;
        parse_env(&lookup, "MAX_RETRIES", &mut self.max_attempts)?;
        parse_env(&lookup, "TEMPERATURE", &mut self.temperature)?;
        parse_env(&lookup, "PREPROCESS_CHUNK_SIZE", &mut self.clean_chunk_chars)?;
        if let Some(model) = lookup("TTS_MODEL") {
            self.speech.model = model;
        }
        if let Some(voice) = lookup("TTS_VOICE") {
            self.speech.voice = voice;
        }
        if let Some(preset) = lookup("TRANSLATION_MODEL") {
            self.model_preset = Some(preset);
        }
        if let Some(preset) = lookup("SUMMARY_MODEL") {
            self.summary_model_preset = Some(preset);
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("clean_chunk_chars", self.clean_chunk_chars),
            ("translate_chunk_chars", self.translate_chunk_chars),
            ("speech_chunk_chars", self.speech_chunk_chars),
            ("summary_input_chars", self.summary_input_chars),
            ("text_calls_per_minute", self.text_calls_per_minute as usize),
            ("speech_calls_per_minute", self.speech_calls_per_minute as usize),
            ("max_attempts", self.max_attempts as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if !(self.backoff_base >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "backoff_base",
                reason: format!("{} is below 1", self.backoff_base),
            });
        }
        if !(self.split_floor > 0.0 && self.split_floor < 1.0) {
            return Err(ConfigError::Invalid {
                field: "split_floor",
                reason: format!("{} is outside (0, 1)", self.split_floor),
            });
        }
        if self.speech.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid {
                field: "speech.extension",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Chunk limit and cut floor for `stage`.
    pub fn segment_options(&self, stage: Stage) -> SegmentOptions {
        let max_chars = match stage {
            Stage::Clean => self.clean_chunk_chars,
            Stage::Translate => self.translate_chunk_chars,
            Stage::Summarize => self.summary_input_chars,
            Stage::Speak => self.speech_chunk_chars,
        };
        SegmentOptions::new(max_chars).with_split_floor(self.split_floor)
    }

    /// Configured llm-client preset for a text stage, if any.
    pub fn model_preset(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Summarize => self
                .summary_model_preset
                .as_deref()
                .or(self.model_preset.as_deref()),
            _ => self.model_preset.as_deref(),
        }
    }

    /// Quota of the pacing window `stage` runs under.
    pub fn calls_per_minute(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Speak => self.speech_calls_per_minute,
            _ => self.text_calls_per_minute,
        }
    }

    pub fn sampling(&self, stage: Stage) -> Sampling {
        let max_tokens = match stage {
            Stage::Summarize => self.summary_max_tokens,
            _ => self.max_tokens,
        };
        Sampling {
            temperature: self.temperature,
            max_tokens,
        }
    }

    /// Handling of exhausted chunks for a text stage.
    pub fn failure_policy(&self, stage: Stage) -> FailurePolicy {
        match (stage, self.translate_on_exhausted) {
            (Stage::Translate, TranslateFallback::Marker) => FailurePolicy::Marker,
            _ => stage.default_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_language, "Chinese (Simplified)");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.translate_chunk_chars, 3000);
        assert_eq!(config.speech_calls_per_minute, 5);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.speech.voice, "nova");
        assert!(config.model_preset.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = PipelineConfig::config_path().unwrap();
        assert!(path.ends_with("cli-programs/bookpipe.toml"));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
model_preset = "azure-gpt5"
temperature = 0.3
translate_chunk_chars = 2500
translate_on_exhausted = "marker"

[speech]
voice = "alloy"
"#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model_preset.as_deref(), Some("azure-gpt5"));
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.translate_chunk_chars, 2500);
        assert_eq!(config.translate_on_exhausted, TranslateFallback::Marker);
        assert_eq!(config.speech.voice, "alloy");
        assert_eq!(config.speech.model, "tts-1-hd");
        assert_eq!(config.failure_policy(Stage::Translate), FailurePolicy::Marker);
        assert_eq!(config.failure_policy(Stage::Clean), FailurePolicy::KeepInput);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/bookpipe.toml");

        let mut config = PipelineConfig::default();
        config.speech_calls_per_minute = 3;
        config.model_preset = Some("openrouter".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(PipelineConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "max_attempts = \"many\"").unwrap();

        let err = PipelineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config
            .apply_env(env(&[
                ("TTS_QPM", "10"),
                ("MAX_RETRIES", " 5 "),
                ("TEMPERATURE", "0.2"),
                ("PREPROCESS_CHUNK_SIZE", "6000"),
                ("TTS_MODEL", "tts-1"),
                ("TTS_VOICE", "shimmer"),
            ]))
            .unwrap();

        assert_eq!(config.speech_calls_per_minute, 10);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.clean_chunk_chars, 6000);
        assert_eq!(config.speech.model, "tts-1");
        assert_eq!(config.speech.voice, "shimmer");
    }

    #[test]
    fn test_summary_preset_overrides_shared_preset() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.model_preset(Stage::Summarize), None);

        config
            .apply_env(env(&[("TRANSLATION_MODEL", "azure-gpt5")]))
            .unwrap();
        assert_eq!(config.model_preset(Stage::Translate), Some("azure-gpt5"));
        assert_eq!(config.model_preset(Stage::Summarize), Some("azure-gpt5"));

        config
            .apply_env(env(&[("SUMMARY_MODEL", "gpt-mini")]))
            .unwrap();
        assert_eq!(config.model_preset(Stage::Summarize), Some("gpt-mini"));
        assert_eq!(config.model_preset(Stage::Clean), Some("azure-gpt5"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = PipelineConfig::default();
        let err = config.apply_env(env(&[("TTS_QPM", "fast")])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for TTS_QPM: \"fast\"");
        assert_eq!(config.speech_calls_per_minute, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<(&str, Box<dyn Fn(&mut PipelineConfig)>)> = vec![
            ("speech_calls_per_minute", Box::new(|c: &mut PipelineConfig| c.speech_calls_per_minute = 0)),
            ("translate_chunk_chars", Box::new(|c: &mut PipelineConfig| c.translate_chunk_chars = 0)),
            ("max_attempts", Box::new(|c: &mut PipelineConfig| c.max_attempts = 0)),
            ("backoff_base", Box::new(|c: &mut PipelineConfig| c.backoff_base = 0.5)),
            ("backoff_base", Box::new(|c: &mut PipelineConfig| c.backoff_base = f64::NAN)),
            ("split_floor", Box::new(|c: &mut PipelineConfig| c.split_floor = 1.0)),
            ("split_floor", Box::new(|c: &mut PipelineConfig| c.split_floor = 0.0)),
        ];

        for (field, mutate) in cases {
            let mut config = PipelineConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected {} to be rejected, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_stage_settings() {
        let config = PipelineConfig::default();
        assert_eq!(config.segment_options(Stage::Clean), SegmentOptions::new(8000));
        assert_eq!(config.segment_options(Stage::Speak), SegmentOptions::new(4000));
        assert_eq!(config.calls_per_minute(Stage::Speak), 5);
        assert_eq!(config.calls_per_minute(Stage::Summarize), 60);
        assert_eq!(config.sampling(Stage::Summarize).max_tokens, 2000);
        assert_eq!(config.sampling(Stage::Translate).max_tokens, 16000);
    }
}
