//! OpenAI-compatible chat completion backend for stage agents.
//!
//! [`ChatClient`] owns the HTTP client, credentials and retry policy and is
//! shared by every [`LlmAgent`]. Each agent carries its stage persona as the
//! system message and its own model binding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use docent_shared::{DocentError, LlmConfig, Result, StageKind};

use crate::stage::{StageAgent, StageDescriptor, StageSet};

/// Upper bound for a server-provided `Retry-After`.
const MAX_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for a `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
    max_retries: u32,
    backoff: Duration,
}

impl ChatClient {
    /// Build a client from the `[llm]` config section.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocentError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Send one system + user exchange and return the assistant text.
    ///
    /// Transport failures, timeouts, 429 and 5xx responses are retried with
    /// exponential backoff up to `max_retries` times.
    #[instrument(skip_all, fields(model = %model))]
    pub async fn complete(
        &self,
        model: &str,
        temperature: f64,
        system: &str,
        user: &str,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
        };

        let mut attempt = 0u32;
        loop {
            match self.send_once(&request).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay(&err, attempt);
                    attempt += 1;
                    warn!(
                        error = %err,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "model request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(DocentError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("HTTP {status}: {}", body.trim());
            return Err(if status.is_server_error() {
                DocentError::Transport(detail)
            } else {
                DocentError::config(format!("model endpoint rejected the request, {detail}"))
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DocentError::MalformedOutput(format!("invalid response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DocentError::MalformedOutput("response has no choices".into()))?;

        if text.trim().is_empty() {
            return Err(DocentError::MalformedOutput("model returned empty text".into()));
        }

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }

    fn request_error(&self, e: reqwest::Error) -> DocentError {
        if e.is_timeout() {
            DocentError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            DocentError::Transport(e.to_string())
        }
    }

    fn retry_delay(&self, err: &DocentError, attempt: u32) -> Duration {
        let exponential = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
        match err {
            DocentError::RateLimited {
                retry_after_secs: Some(secs),
            } => exponential.max(Duration::from_secs((*secs).min(MAX_RETRY_AFTER_SECS))),
            _ => exponential,
        }
    }
}

/// A stage agent backed by a chat model.
pub struct LlmAgent {
    client: Arc<ChatClient>,
    model: String,
    temperature: f64,
    system_prompt: String,
}

impl LlmAgent {
    /// Agent for `descriptor`, speaking as its role.
    pub fn new(
        client: Arc<ChatClient>,
        model: impl Into<String>,
        temperature: f64,
        descriptor: &StageDescriptor,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            system_prompt: persona(descriptor),
        }
    }
}

#[async_trait]
impl StageAgent for LlmAgent {
    async fn invoke(&self, instruction: &str) -> Result<String> {
        self.client
            .complete(&self.model, self.temperature, &self.system_prompt, instruction)
            .await
    }

    fn describe(&self) -> String {
        self.model.clone()
    }
}

/// System message for a stage persona.
fn persona(d: &StageDescriptor) -> String {
    format!(
        "You are the {}.\nYour goal: {}\n{}\n\nExpected output: {}",
        d.role, d.goal, d.backstory, d.expected_output
    )
}

/// The default stage set, every stage backed by `client` with the model
/// configured for it.
pub fn llm_stages(config: &LlmConfig, client: Arc<ChatClient>) -> StageSet {
    StageSet::from_fn(|kind: StageKind| {
        let descriptor = StageDescriptor::default_for(kind);
        let agent: Arc<dyn StageAgent> = Arc::new(LlmAgent::new(
            Arc::clone(&client),
            config.model_for(kind),
            config.temperature,
            &descriptor,
        ));
        agent
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            max_retries: 2,
            retry_backoff_ms: 1,
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        })
    }

    #[tokio::test]
    async fn returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("A summary.")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&test_config(server.uri()), "sk-test").unwrap();
        let text = client
            .complete("test-model", 0.2, "system", "summarize")
            .await
            .expect("completion");
        assert_eq!(text, "A summary.");
    }

    #[tokio::test]
    async fn retries_after_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&test_config(server.uri()), "sk-test").unwrap();
        let text = client.complete("m", 0.2, "s", "u").await.expect("retried");
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let client = ChatClient::new(&test_config(server.uri()), "sk-test").unwrap();
        let err = client.complete("m", 0.2, "s", "u").await.unwrap_err();
        assert!(matches!(err, DocentError::Transport(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&test_config(server.uri()), "sk-wrong").unwrap();
        let err = client.complete("m", 0.2, "s", "u").await.unwrap_err();
        assert!(matches!(err, DocentError::Config { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn missing_choices_are_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&test_config(server.uri()), "sk-test").unwrap();
        let err = client.complete("m", 0.2, "s", "u").await.unwrap_err();
        assert!(matches!(err, DocentError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn empty_content_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;

        let client = ChatClient::new(&test_config(server.uri()), "sk-test").unwrap();
        let err = client.complete("m", 0.2, "s", "u").await.unwrap_err();
        assert!(matches!(err, DocentError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn agent_sends_persona_and_instruction() {
        let server = MockServer::start().await;
        let descriptor = StageDescriptor::default_for(StageKind::Critic);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "critic-model",
                "messages": [
                    { "role": "system", "content": persona(&descriptor) },
                    { "role": "user", "content": "critique this" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("weak data")))
            .expect(1)
            .mount(&server)
            .await;

        let client = Arc::new(ChatClient::new(&test_config(server.uri()), "sk-test").unwrap());
        let agent = LlmAgent::new(client, "critic-model", 0.3, &descriptor);

        assert_eq!(agent.describe(), "critic-model");
        assert_eq!(agent.invoke("critique this").await.unwrap(), "weak data");
    }

    #[test]
    fn stage_models_override_default() {
        let mut config = test_config("http://localhost".into());
        config.stage_models.insert("critic".into(), "critic-model".into());
        let client = Arc::new(ChatClient::new(&config, "sk").unwrap());

        let stages = llm_stages(&config, client);
        assert_eq!(stages.get(StageKind::Critic).agent().describe(), "critic-model");
        assert_eq!(
            stages.get(StageKind::Reader).agent().describe(),
            config.default_model
        );
    }

    #[test]
    fn retry_after_raises_delay() {
        let client = ChatClient::new(&test_config("http://localhost".into()), "sk").unwrap();
        let err = DocentError::RateLimited {
            retry_after_secs: Some(2),
        };
        assert_eq!(client.retry_delay(&err, 0), Duration::from_secs(2));
        assert_eq!(
            client.retry_delay(&DocentError::Transport("x".into()), 3),
            Duration::from_millis(8)
        );
    }
}
