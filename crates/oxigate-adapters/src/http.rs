//! Generic HTTP adapter for OpenAI-compatible `/chat/completions` APIs.
//!
//! One instance per configured provider. Handles bearer auth, extra
//! headers, the per-call timeout, and the mapping of vendor error codes
//! into the shared [`AdapterError`] taxonomy.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use oxigate_core::config::ProviderSettings;
use oxigate_core::types::{ChatTurn, TaskPayload};

use crate::error::AdapterError;
use crate::traits::{AdapterOutput, ProviderAdapter};

// ─────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatTurn>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ─────────────────────────────────────────────
// HttpAdapter
// ─────────────────────────────────────────────

/// Adapter for any provider speaking the OpenAI-compatible chat API.
pub struct HttpAdapter {
    /// HTTP client (shared, connection-pooled). No client-level timeout —
    /// the per-call timeout is applied per request.
    client: reqwest::Client,
    name: String,
    model: String,
    api_base: String,
    api_key: String,
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for HttpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl HttpAdapter {
    /// Build an adapter from a provider's settings. Invalid extra headers
    /// are skipped with a warning rather than failing construction.
    pub fn new(settings: &ProviderSettings) -> Self {
        let api_base = settings
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = settings.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!(provider = %settings.name, "Invalid header: {}={}", key, value);
                }
            }
        }

        HttpAdapter {
            client: reqwest::Client::new(),
            name: settings.name.clone(),
            model: settings.model.clone(),
            api_base,
            api_key: settings.api_key.clone(),
            extra_headers,
        }
    }

    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn map_status(status: reqwest::StatusCode) -> AdapterError {
        match status.as_u16() {
            401 | 403 => AdapterError::AuthFailed,
            429 => AdapterError::RateLimited,
            code => AdapterError::ServerError { status: code },
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    async fn invoke(
        &self,
        payload: &TaskPayload,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<AdapterOutput, AdapterError> {
        let messages = payload.to_turns();

        debug!(
            provider = %self.name,
            model = %self.model,
            task = %payload.kind(),
            messages = messages.len(),
            "Calling provider"
        );

        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens,
        };

        let started = Instant::now();
        let result = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .headers(self.extra_headers.clone())
            .timeout(timeout)
            .json(&request_body)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                warn!(provider = %self.name, timeout_ms = timeout.as_millis() as u64, "Provider timed out");
                return Err(AdapterError::Timeout);
            }
            Err(e) => {
                warn!(provider = %self.name, error = %e, "HTTP request failed");
                return Err(AdapterError::Network(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = %status, body = %body, "Provider API error");
            return Err(Self::map_status(status));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let latency = started.elapsed();

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::MalformedResponse("no choices in response".to_string()))?;
        let content = choice
            .message
            .content
            .ok_or_else(|| AdapterError::MalformedResponse("choice has no content".to_string()))?;

        // Providers that omit usage get the rough char-based estimate.
        let (tokens_in, tokens_out) = match parsed.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (
                payload.estimate_input_tokens(),
                (content.chars().count() as u32).div_ceil(4),
            ),
        };

        debug!(
            provider = %self.name,
            tokens_in,
            tokens_out,
            latency_ms = latency.as_millis() as u64,
            "Provider response received"
        );

        Ok(AdapterOutput {
            content,
            tokens_in,
            tokens_out,
            latency,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(name: &str, api_base: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            name: name.to_string(),
            model: format!("{name}-large"),
            api_key: "test-key-123".to_string(),
            api_base: api_base.map(String::from),
            ..ProviderSettings::default()
        }
    }

    fn prompt(text: &str) -> TaskPayload {
        TaskPayload::Generation {
            prompt: text.to_string(),
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    // ── Unit tests ──

    #[test]
    fn test_completions_url_trailing_slash() {
        let adapter = HttpAdapter::new(&settings("alpha", Some("https://api.alpha.test/v1/")));
        assert_eq!(
            adapter.completions_url(),
            "https://api.alpha.test/v1/chat/completions"
        );
    }

    #[test]
    fn test_default_api_base() {
        let adapter = HttpAdapter::new(&settings("alpha", None));
        assert_eq!(adapter.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;
        assert_eq!(
            HttpAdapter::map_status(StatusCode::UNAUTHORIZED),
            AdapterError::AuthFailed
        );
        assert_eq!(
            HttpAdapter::map_status(StatusCode::TOO_MANY_REQUESTS),
            AdapterError::RateLimited
        );
        assert_eq!(
            HttpAdapter::map_status(StatusCode::BAD_GATEWAY),
            AdapterError::ServerError { status: 502 }
        );
    }

    #[test]
    fn test_extra_headers_applied() {
        let mut headers = HashMap::new();
        headers.insert("X-App-Code".to_string(), "oxigate".to_string());
        let mut s = settings("alpha", None);
        s.extra_headers = Some(headers);
        let adapter = HttpAdapter::new(&s);
        assert!(adapter.extra_headers.contains_key("x-app-code"));
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_invoke_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hello from alpha."}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
            })))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let out = adapter.invoke(&prompt("Hello"), 256, TIMEOUT).await.unwrap();

        assert_eq!(out.content, "Hello from alpha.");
        assert_eq!(out.tokens_in, 12);
        assert_eq!(out.tokens_out, 4);
    }

    #[tokio::test]
    async fn test_invoke_sends_model_and_max_tokens() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "alpha-large",
                "max_tokens": 128
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}],
                "usage": null
            })))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        // If the body matcher fails, wiremock answers 404 → ServerError.
        let out = adapter.invoke(&prompt("test"), 128, TIMEOUT).await.unwrap();
        assert_eq!(out.content, "ok");
    }

    #[tokio::test]
    async fn test_invoke_chat_payload_roles() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "Be terse."},
                    {"role": "user", "content": "Hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hi."}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })))
            .mount(&mock_server)
            .await;

        let payload = TaskPayload::Chat {
            messages: vec![ChatTurn::system("Be terse."), ChatTurn::user("Hi")],
        };
        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let out = adapter.invoke(&payload, 64, TIMEOUT).await.unwrap();
        assert_eq!(out.content, "Hi.");
    }

    #[tokio::test]
    async fn test_invoke_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit exceeded", "type": "rate_limit_error"}
            })))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let err = adapter.invoke(&prompt("x"), 64, TIMEOUT).await.unwrap_err();
        assert_eq!(err, AdapterError::RateLimited);
    }

    #[tokio::test]
    async fn test_invoke_auth_failed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let err = adapter.invoke(&prompt("x"), 64, TIMEOUT).await.unwrap_err();
        assert_eq!(err, AdapterError::AuthFailed);
    }

    #[tokio::test]
    async fn test_invoke_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let err = adapter.invoke(&prompt("x"), 64, TIMEOUT).await.unwrap_err();
        assert_eq!(err, AdapterError::ServerError { status: 503 });
    }

    #[tokio::test]
    async fn test_invoke_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let err = adapter.invoke(&prompt("x"), 64, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, AdapterError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_invoke_empty_choices_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [],
                "usage": null
            })))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let err = adapter.invoke(&prompt("x"), 64, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, AdapterError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(serde_json::json!({
                        "choices": [{"message": {"content": "slow"}}],
                        "usage": null
                    })),
            )
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let err = adapter
            .invoke(&prompt("x"), 64, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::Timeout);
    }

    #[tokio::test]
    async fn test_invoke_network_error() {
        // Point at a port that is not listening.
        let adapter = HttpAdapter::new(&settings("alpha", Some("http://127.0.0.1:1")));
        let err = adapter.invoke(&prompt("x"), 64, TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Network(_) | AdapterError::Timeout
        ));
    }

    #[tokio::test]
    async fn test_missing_usage_falls_back_to_estimate() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "12345678"}}],
                "usage": null
            })))
            .mount(&mock_server)
            .await;

        let adapter = HttpAdapter::new(&settings("alpha", Some(&mock_server.uri())));
        let out = adapter
            .invoke(&prompt("abcdefgh"), 64, TIMEOUT)
            .await
            .unwrap();
        // 8 chars → 2 estimated tokens each way
        assert_eq!(out.tokens_in, 2);
        assert_eq!(out.tokens_out, 2);
    }
}
