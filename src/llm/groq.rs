//! Groq through its OpenAI-compatible chat completions endpoint.
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LlmError, status_error};
use super::http;
use super::provider::{GenerationParams, Generator, Message, Role};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Clone)]
pub struct GroqGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GroqGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroqGenerator")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GroqGenerator {
    pub fn new(
        api_key: String,
        model: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: http::client(timeout)?,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Generator for GroqGenerator {
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let api_messages: Vec<ApiMessage<'_>> = messages
            .iter()
            .map(|m| ApiMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect();
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        debug!("Groq request: {} messages, model {}", api_messages.len(), self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let resp: ChatResponse = response.json().await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::EmptyResponse {
                provider: self.name(),
            })
    }

    fn name(&self) -> &'static str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(base: &str) -> GroqGenerator {
        GroqGenerator::new(
            "gsk-test".into(),
            DEFAULT_MODEL.into(),
            base,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn generate_sends_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 2000,
                "messages": [
                    {"role": "system", "content": "You are an expert code assistant."},
                    {"role": "user", "content": "what does main do?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "It starts the server."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = generator(&server.uri())
            .generate(
                &[
                    Message::system("You are an expert code assistant."),
                    Message::user("what does main do?"),
                ],
                &GenerationParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(answer, "It starts the server.");
    }

    #[tokio::test]
    async fn generate_reports_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = generator(&server.uri())
            .generate(&[Message::user("x")], &GenerationParams::default())
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn generate_rejects_missing_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = generator(&server.uri())
            .generate(&[Message::user("x")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { provider: "groq" }));
    }
}
