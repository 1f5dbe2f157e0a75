//! Text generation calls: cleanup, translation and summarization.

use anyhow::Context;
use async_trait::async_trait;
use llm_client::{LlmError, LlmProvider, LlmRequest};
use std::sync::Arc;

use crate::runner::ChunkCall;
use crate::text::Chunk;

const CLEANUP_SYSTEM: &str = "You repair text extracted from PDF books. You fix paragraph breaks \
     and hyphenation and add Markdown structure without changing the wording.";

const TRANSLATE_SYSTEM: &str = "You are a literary translator producing complete, faithful \
     translations of book chapters.";

const SUMMARY_SYSTEM: &str = "You write concise, insightful chapter summaries.";

/// Sampling settings shared by the text calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Send one request and return the trimmed reply; a blank reply is an error.
async fn generate(provider: &dyn LlmProvider, request: LlmRequest) -> anyhow::Result<String> {
    let response = provider
        .complete(request)
        .await
        .with_context(|| format!("{} request failed", provider.name()))?;

    if let Some(usage) = &response.usage {
        log::debug!(
            "{} ({}): {} tokens in, {} out",
            provider.name(),
            response.model,
            usage.input_tokens,
            usage.output_tokens
        );
    }

    let content = response.content.trim();
    if content.is_empty() {
        return Err(LlmError::EmptyResponse {
            provider: provider.name().to_string(),
        }
        .into());
    }
    Ok(content.to_string())
}

/// Fixes extraction artifacts and adds Markdown headings.
pub struct CleanupCall {
    provider: Arc<dyn LlmProvider>,
    sampling: Sampling,
}

impl CleanupCall {
    pub fn new(provider: Arc<dyn LlmProvider>, sampling: Sampling) -> Self {
        Self { provider, sampling }
    }

    fn request(&self, chunk: &Chunk) -> LlmRequest {
        let prompt = format!(
            "Clean up this extracted book text and format it as Markdown.\n\n\
             Repairs:\n\
             - Merge paragraphs split by page breaks when the topic continues\n\
             - Rejoin words hyphenated across lines\n\
             - Merge sentences broken across paragraphs\n\
             - Keep deliberate paragraph breaks\n\n\
             Formatting:\n\
             - Chapter title as `# Title`\n\
             - Subtitle or tagline as `*subtitle*`\n\
             - Section headings as `## Heading`\n\n\
             Do not reword, add or remove content.\n\n\
             Text:\n\n{}\n\n\
             Cleaned Markdown:",
            chunk.text
        );
        LlmRequest::new(prompt)
            .with_system(CLEANUP_SYSTEM)
            .with_temperature(self.sampling.temperature)
            .with_max_tokens(self.sampling.max_tokens)
    }
}

#[async_trait]
impl ChunkCall for CleanupCall {
    type Output = String;

    fn label(&self) -> &str {
        "clean"
    }

    async fn call(&self, chunk: &Chunk) -> anyhow::Result<String> {
        generate(self.provider.as_ref(), self.request(chunk)).await
    }
}

/// Translates chunks into the target language, keeping Markdown markers.
pub struct TranslateCall {
    provider: Arc<dyn LlmProvider>,
    sampling: Sampling,
    target_language: String,
}

impl TranslateCall {
    pub fn new(provider: Arc<dyn LlmProvider>, sampling: Sampling, target_language: &str) -> Self {
        Self {
            provider,
            sampling,
            target_language: target_language.to_string(),
        }
    }

    fn request(&self, chunk: &Chunk) -> LlmRequest {
        let prompt = format!(
            "Translate the following English text into {lang}.\n\n\
             - Stay faithful to the meaning and tone\n\
             - Write natural, idiomatic {lang}\n\
             - Translate everything; do not summarize or skip\n\
             - Keep Markdown symbols (# ## *) exactly as they are\n\n\
             Text (part {index} of {total}):\n\n{text}\n\n\
             {lang} translation:",
            lang = self.target_language,
            index = chunk.index,
            total = chunk.total,
            text = chunk.text
        );
        LlmRequest::new(prompt)
            .with_system(TRANSLATE_SYSTEM)
            .with_temperature(self.sampling.temperature)
            .with_max_tokens(self.sampling.max_tokens)
    }
}

#[async_trait]
impl ChunkCall for TranslateCall {
    type Output = String;

    fn label(&self) -> &str {
        "translate"
    }

    async fn call(&self, chunk: &Chunk) -> anyhow::Result<String> {
        generate(self.provider.as_ref(), self.request(chunk)).await
    }
}

/// Summarizes a chapter in a few paragraphs, in the chapter's language.
pub struct SummaryCall {
    provider: Arc<dyn LlmProvider>,
    sampling: Sampling,
    language: String,
}

impl SummaryCall {
    pub fn new(provider: Arc<dyn LlmProvider>, sampling: Sampling, language: &str) -> Self {
        Self {
            provider,
            sampling,
            language: language.to_string(),
        }
    }

    fn request(&self, chunk: &Chunk) -> LlmRequest {
        let prompt = format!(
            "Summarize this chapter in 2-3 paragraphs, written in {lang}.\n\n\
             Cover the main ideas, the important concepts or lessons, and the \
             practical takeaways.\n\n\
             Text:\n{text}\n\n\
             Summary ({lang}):",
            lang = self.language,
            text = chunk.text
        );
        LlmRequest::new(prompt)
            .with_system(SUMMARY_SYSTEM)
            .with_temperature(self.sampling.temperature)
            .with_max_tokens(self.sampling.max_tokens)
    }
}

#[async_trait]
impl ChunkCall for SummaryCall {
    type Output = String;

    fn label(&self) -> &str {
        "summarize"
    }

    async fn call(&self, chunk: &Chunk) -> anyhow::Result<String> {
        generate(self.provider.as_ref(), self.request(chunk)).await
    }
}

/// The leading `max_chars` chars of `text`, the only part a summary sees.
pub fn summary_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
