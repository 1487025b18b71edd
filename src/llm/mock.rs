//! Scripted generator for tests and offline runs.

use std::sync::{Arc, Mutex, PoisonError};

use super::error::LlmError;
use super::provider::{GenerationParams, Generator, Message};

/// Replies with queued responses (then `default_response`) and records every
/// conversation it was sent.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    responses: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<(Vec<Message>, GenerationParams)>>>,
    pub default_response: String,
    pub fail: bool,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            fail: false,
        }
    }
}

impl MockGenerator {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Conversations received so far, oldest first.
    pub fn calls(&self) -> Vec<(Vec<Message>, GenerationParams)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Generator for MockGenerator {
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((messages.to_vec(), *params));

        if self.fail {
            return Err(LlmError::Other("mock generation error".into()));
        }
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock"
    }
}
