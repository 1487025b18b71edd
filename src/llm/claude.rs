use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LlmError, status_error};
use super::http;
use super::provider::{GenerationParams, Generator, Message, Role};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct ClaudeGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for ClaudeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeGenerator")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ClaudeGenerator {
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

impl Generator for ClaudeGenerator {
    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let (system, chat) = split_messages(messages);
        let body = RequestBody {
            model: &self.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system: system.as_deref(),
            messages: &chat,
        };

        debug!("Claude request: {} messages, model {}", chat.len(), self.model);
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let resp: ApiResponse = response.json().await?;
        let text: String = resp
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.name(),
            });
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// System messages go into the top-level `system` field; the rest keep
/// their order.
fn split_messages(messages: &[Message]) -> (Option<String>, Vec<ApiMessage<'_>>) {
    let mut system_parts = Vec::new();
    let mut chat = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.as_str()),
            Role::User => chat.push(ApiMessage {
                role: "user",
                content: &msg.content,
            }),
            Role::Assistant => chat.push(ApiMessage {
                role: "assistant",
                content: &msg.content,
            }),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, chat)
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ApiMessage<'a>],
}

#[derive(Serialize, Debug)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(base: &str) -> ClaudeGenerator {
        ClaudeGenerator::new(
            "test-key".into(),
            DEFAULT_MODEL.into(),
            base,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn split_messages_extracts_system() {
        let messages = vec![
            Message::system("context"),
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::system("more"),
            Message::user("again"),
        ];
        let (system, chat) = split_messages(&messages);
        assert_eq!(system.unwrap(), "context\n\nmore");
        let roles: Vec<&str> = chat.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[test]
    fn split_messages_no_system() {
        let one = [Message::user("Hi")];
        let (system, chat) = split_messages(&one);
        assert!(system.is_none());
        assert_eq!(chat.len(), 1);
    }

    #[test]
    fn debug_redacts_key() {
        let out = format!("{:?}", generator("http://localhost"));
        assert!(!out.contains("test-key"));
    }

    #[tokio::test]
    async fn generate_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_MODEL,
                "max_tokens": 2000,
                "system": "be brief",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "hi there"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = generator(&server.uri())
            .generate(
                &[Message::system("be brief"), Message::user("hello")],
                &GenerationParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(answer, "hi there");
    }

    #[tokio::test]
    async fn generate_maps_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = generator(&server.uri())
            .generate(&[Message::user("x")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { provider: "claude" }));
    }

    #[tokio::test]
    async fn generate_rejects_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "content": [] })),
            )
            .mount(&server)
            .await;

        let err = generator(&server.uri())
            .generate(&[Message::user("x")], &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
