//! Core `ChatCompletion` trait and `ApiCompletion` implementation.
//!
//! `ApiCompletion` calls any OpenAI-compatible `/chat/completions` endpoint:
//! OpenAI, Groq, Ollama (OpenAI mode), LM Studio, vLLM, etc.
//! Connection details come from [`LlmConfig`]; sampling parameters travel with
//! every request as [`CompletionParams`] so a settings change applies to the
//! next run without rebuilding the client.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the completion endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("LLM endpoint returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The response carried no `message.content` text.
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionParams
// ---------------------------------------------------------------------------

/// Model and sampling parameters sent with every stage of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl CompletionParams {
    /// Build the `/chat/completions` JSON body for a single user message.
    pub fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model":             self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "stream":            false,
            "temperature":       self.temperature,
            "max_tokens":        self.max_tokens,
            "presence_penalty":  self.presence_penalty,
            "frequency_penalty": self.frequency_penalty
        })
    }
}

impl Default for CompletionParams {
    fn default() -> Self {
        LlmConfig::default().completion_params()
    }
}

// ---------------------------------------------------------------------------
// ChatCompletion trait
// ---------------------------------------------------------------------------

/// Async trait for a single-turn chat completion.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn ChatCompletion>` between the orchestrator and chain tasks.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Send `prompt` as one user message and return the assistant's text.
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, LlmError>;

    /// Chat-capable model ids offered by the provider.
    ///
    /// Backends that cannot enumerate models return an empty list.
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// ApiCompletion
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/chat/completions` endpoint.
pub struct ApiCompletion {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ApiCompletion {
    /// Build an `ApiCompletion` from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A default (no-timeout) client is used if the
    /// builder fails.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_base: config.api_base(),
            api_key: config.api_key.clone(),
        }
    }

    /// Root URL all requests are made against.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // Local providers need no key; never send an empty bearer token.
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

/// Turn a non-2xx response into [`LlmError::Status`], keeping the body for
/// the error message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Status {
        code: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatCompletion for ApiCompletion {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = params.request_body(prompt);

        log::debug!(
            "llm: POST {url} model={} prompt_len={}",
            params.model,
            prompt.len()
        );

        let response = self.authorize(self.client.post(&url).json(&body)).send().await?;
        let response = check_status(response).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        extract_message_content(&json)
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/models", self.api_base);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = check_status(response).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(chat_model_ids(&json))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Pull `choices[0].message.content` out of a chat-completion response.
///
/// The text is returned exactly as sent, whitespace included, since the next
/// stage embeds it verbatim.
pub fn extract_message_content(json: &serde_json::Value) -> Result<String, LlmError> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or(LlmError::EmptyResponse)
}

/// Model ids that are not chat models, matched as substrings.
const NON_CHAT_MODEL_MARKERS: &[&str] = &["whisper", "tts", "embedding", "dall-e", "moderation"];

/// Sorted chat-model ids from a `/models` listing.
pub fn chat_model_ids(json: &serde_json::Value) -> Vec<String> {
    let mut ids: Vec<String> = json["data"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m["id"].as_str())
                .filter(|id| !NON_CHAT_MODEL_MARKERS.iter().any(|mark| id.contains(mark)))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids.dedup();
    ids
}

// ---------------------------------------------------------------------------
// MockCompletion  (test-only)
// ---------------------------------------------------------------------------

/// Completion double that answers call `n` with `"reply n"`.
///
/// Records every prompt it receives, can fail on a chosen call, and can wait
/// before answering to simulate a slow endpoint.
#[cfg(test)]
#[derive(Default)]
pub struct MockCompletion {
    pub fail_on_call: Option<usize>,
    pub delay: Option<std::time::Duration>,
    pub models: Vec<String>,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockCompletion {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn slow(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatCompletion for MockCompletion {
    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<String, LlmError> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_call == Some(call) {
            return Err(LlmError::Status {
                code: 500,
                body: "mock failure".into(),
            });
        }
        Ok(format!("reply {call}"))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(self.models.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn make_config(api_key: &str) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAiCompatible,
            base_url: Some("http://localhost:11434".into()),
            api_key: api_key.into(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn from_config_resolves_api_base() {
        let completion = ApiCompletion::from_config(&make_config(""));
        assert_eq!(completion.api_base(), "http://localhost:11434/v1");

        let groq = ApiCompletion::from_config(&LlmConfig {
            provider: LlmProvider::Groq,
            ..LlmConfig::default()
        });
        assert_eq!(groq.api_base(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn request_body_carries_sampling_params() {
        let params = CompletionParams {
            model: "gpt-4o-mini".into(),
            temperature: 0.5,
            max_tokens: 200,
            presence_penalty: 0.25,
            frequency_penalty: -0.5,
        };
        let body = params.request_body("hello");

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["presence_penalty"], 0.25);
        assert_eq!(body["frequency_penalty"], -0.5);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn content_is_passed_through_unchanged() {
        let json = serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": "  Once upon a time.\n" } } ]
        });
        assert_eq!(
            extract_message_content(&json).unwrap(),
            "  Once upon a time.\n"
        );

        let blank = serde_json::json!({
            "choices": [ { "message": { "content": "" } } ]
        });
        assert_eq!(extract_message_content(&blank).unwrap(), "");
    }

    #[test]
    fn missing_content_is_empty_response() {
        let missing = serde_json::json!({ "choices": [] });
        assert!(matches!(
            extract_message_content(&missing),
            Err(LlmError::EmptyResponse)
        ));

        let refused = serde_json::json!({
            "choices": [ { "message": { "content": null } } ]
        });
        assert!(matches!(
            extract_message_content(&refused),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn model_listing_drops_non_chat_models() {
        let json = serde_json::json!({
            "data": [
                { "id": "gpt-4o" },
                { "id": "whisper-1" },
                { "id": "tts-1-hd" },
                { "id": "text-embedding-3-small" },
                { "id": "gpt-3.5-turbo" },
                { "id": "dall-e-3" },
                { "id": "gpt-4o" }
            ]
        });
        assert_eq!(chat_model_ids(&json), vec!["gpt-3.5-turbo", "gpt-4o"]);
    }

    #[test]
    fn model_listing_without_data_is_empty() {
        assert!(chat_model_ids(&serde_json::json!({})).is_empty());
    }

    /// Verify that `ApiCompletion` is object-safe (usable as `dyn ChatCompletion`).
    #[test]
    fn completion_is_object_safe() {
        let completion: Box<dyn ChatCompletion> =
            Box::new(ApiCompletion::from_config(&make_config("sk-test")));
        drop(completion);
    }
}
