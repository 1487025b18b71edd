#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited by {provider}")]
    RateLimited { provider: &'static str },

    #[error("{provider} API request failed (status {status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

/// Turn a non-success HTTP response into the matching error.
pub(crate) async fn status_error(provider: &'static str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited { provider };
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{provider} API error {status}: {body}");
    LlmError::Api {
        provider,
        status: status.as_u16(),
        body,
    }
}
