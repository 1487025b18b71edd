use std::future::Future;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling settings sent with every generation call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2000,
        }
    }
}

/// A text-generation backend.
pub trait Generator: Send + Sync {
    /// Send the conversation and return the reply text verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or its response is
    /// unusable. No retries are attempted.
    fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &'static str;

    fn model(&self) -> &str;
}
