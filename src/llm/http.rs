//! Shared HTTP client construction for the generation backends.

use std::time::Duration;

use super::error::LlmError;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client with a 30s connect timeout, the given request timeout, rustls TLS
/// and a `coderag/{version}` user agent.
pub fn client(request_timeout: Duration) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("coderag/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?)
}
