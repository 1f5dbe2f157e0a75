//! Mock providers for testing
//!
//! Configurable stand-ins for the text and speech providers that can simulate
//! failures, retries and successful responses, and record what they were asked.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse, SpeechProvider, SpeechRequest};

type ErrorFactory = Box<dyn Fn() -> LlmError + Send + Sync>;

/// Shared failure schedule: fail the first `fail_count` calls, then succeed
struct Script {
    fail_count: usize,
    call_count: AtomicUsize,
    fail_with: Option<ErrorFactory>,
}

impl Script {
    fn new(fail_count: usize, fail_with: Option<ErrorFactory>) -> Self {
        Self {
            fail_count,
            call_count: AtomicUsize::new(0),
            fail_with,
        }
    }

    /// Register a call and return the error to produce, if any
    fn next_error(&self) -> Option<LlmError> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if call_num < self.fail_count {
            self.fail_with.as_ref().map(|make| make())
        } else {
            None
        }
    }

    fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

/// How a successful text response is produced
enum Reply {
    Fixed(String),
    Echo,
}

/// A mock text provider for testing retry and fallback behavior
pub struct MockProvider {
    script: Script,
    reply: Reply,
    requests: Mutex<Vec<LlmRequest>>,
    name: &'static str,
}

impl MockProvider {
    fn build(fail_count: usize, fail_with: Option<ErrorFactory>, reply: Reply) -> Self {
        Self {
            script: Script::new(fail_count, fail_with),
            reply,
            requests: Mutex::new(Vec::new()),
            name: "mock",
        }
    }

    /// Create a provider that fails `n` times with errors from `error`, then succeeds
    pub fn fails_then_succeeds(
        n: usize,
        error: impl Fn() -> LlmError + Send + Sync + 'static,
        response: &str,
    ) -> Self {
        Self::build(n, Some(Box::new(error)), Reply::Fixed(response.to_string()))
    }

    /// Create a provider that always fails with errors from `error`
    pub fn always_fails(error: impl Fn() -> LlmError + Send + Sync + 'static) -> Self {
        Self::build(usize::MAX, Some(Box::new(error)), Reply::Fixed(String::new()))
    }

    /// Create a provider that always succeeds with a fixed response
    pub fn always_succeeds(response: &str) -> Self {
        Self::build(0, None, Reply::Fixed(response.to_string()))
    }

    /// Create a provider that answers with the prompt it was sent
    pub fn echo() -> Self {
        Self::build(0, None, Reply::Echo)
    }

    /// Get the number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.script.calls()
    }

    /// Requests received so far, in call order
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Set a custom provider name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(err) = self.script.next_error() {
            return Err(err);
        }

        let content = match &self.reply {
            Reply::Fixed(text) => text.clone(),
            Reply::Echo => request.prompt,
        };

        Ok(LlmResponse {
            content,
            model: "mock-model".to_string(),
            usage: None,
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// A mock speech provider returning the input text's bytes as "audio"
pub struct MockSpeechProvider {
    script: Script,
    inputs: Mutex<Vec<String>>,
}

impl MockSpeechProvider {
    pub fn always_succeeds() -> Self {
        Self {
            script: Script::new(0, None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn fails_then_succeeds(
        n: usize,
        error: impl Fn() -> LlmError + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Script::new(n, Some(Box::new(error))),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.script.calls()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechProvider for MockSpeechProvider {
    async fn synthesize(&self, request: SpeechRequest) -> Result<Vec<u8>> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(request.input.clone());
        }

        if let Some(err) = self.script.next_error() {
            return Err(err);
        }

        Ok(request.input.into_bytes())
    }

    fn name(&self) -> &'static str {
        "mock-speech"
    }
}
