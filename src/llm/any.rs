use std::time::Duration;

use tracing::info;

use super::claude::ClaudeGenerator;
use super::error::LlmError;
use super::groq::GroqGenerator;
use super::provider::{GenerationParams, Generator, Message};
use crate::config::{Credentials, LlmConfig};

/// Generates a match over all `Backend` variants, binding the inner
/// generator and evaluating the given expression for each arm.
macro_rules! delegate_backend {
    ($self:expr, |$g:ident| $expr:expr) => {
        match $self {
            Backend::Groq($g) => $expr,
            Backend::Claude($g) => $expr,
        }
    };
}

/// The generation backend picked at startup.
#[derive(Debug, Clone)]
pub enum Backend {
    Groq(GroqGenerator),
    Claude(ClaudeGenerator),
}

impl Backend {
    /// Pick a backend from the available credentials: Groq first, then
    /// Anthropic. `Ok(None)` when neither key is set.
    pub fn from_credentials(
        config: &LlmConfig,
        credentials: &Credentials,
    ) -> Result<Option<Self>, LlmError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let backend = if let Some(key) = &credentials.groq_api_key {
            Self::Groq(GroqGenerator::new(
                key.clone(),
                config.groq_model.clone(),
                &config.groq_base_url,
                timeout,
            )?)
        } else if let Some(key) = &credentials.anthropic_api_key {
            Self::Claude(ClaudeGenerator::new(
                key.clone(),
                config.anthropic_model.clone(),
                &config.anthropic_base_url,
                timeout,
            )?)
        } else {
            return Ok(None);
        };

        info!(
            "Generation backend: {} ({})",
            backend.name(),
            backend.model()
        );
        Ok(Some(backend))
    }
}

impl Generator for Backend {
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        delegate_backend!(self, |g| g.generate(messages, params).await)
    }

    fn name(&self) -> &'static str {
        delegate_backend!(self, |g| g.name())
    }

    fn model(&self) -> &str {
        delegate_backend!(self, |g| g.model())
    }
}
