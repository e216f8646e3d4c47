//! Vision model interaction: one request per form, raw reply text back.
//!
//! The run only depends on the [`VisionExtractor`] capability, so tests
//! substitute a fake and never touch the network. Two real backends exist:
//!
//! * [`ChatCompletionsClient`] — posts the chat-completions request below
//!   straight to an OpenAI-compatible endpoint with `reqwest`.
//! * [`ProviderExtractor`] — routes the same prompt and images through an
//!   `edgequake_llm` provider (Anthropic, Gemini, Ollama, …).
//!
//! ## Request shape
//!
//! ```json
//! {
//!   "model": "gpt-4o",
//!   "temperature": 0.2,
//!   "max_tokens": 1000,
//!   "messages": [{
//!     "role": "user",
//!     "content": [
//!       {"type": "text", "text": "<prompt>"},
//!       {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,<page 1>"}},
//!       {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,<page 2>"}}
//!     ]
//!   }]
//! }
//! ```
//!
//! Neither backend caches or retries: every call is exactly one request.

use crate::config::ExtractionConfig;
use crate::error::{FormExtractError, VisionError};
use crate::pipeline::encode::EncodedImage;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Turns two form page images plus a prompt into the model's raw reply.
pub trait VisionExtractor {
    /// Send one request; first page image, then second.
    fn extract(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
        prompt: &str,
    ) -> impl Future<Output = Result<String, VisionError>> + Send;
}

// ── Direct chat-completions client ───────────────────────────────────────────

/// Request body for a chat-completions call.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
    pub messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RequestMessage<'a> {
    pub role: &'static str,
    pub content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// `reqwest` client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsClient {
    pub fn new(
        api_key: impl Into<String>,
        config: &ExtractionConfig,
    ) -> Result<Self, FormExtractError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| FormExtractError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        })
    }

    /// Build the request body for one form.
    pub fn build_request<'a>(
        &'a self,
        first: &EncodedImage,
        second: &EncodedImage,
        prompt: &'a str,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: first.data_uri(),
                        },
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: second.data_uri(),
                        },
                    },
                ],
            }],
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> VisionError {
        if e.is_timeout() {
            VisionError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            VisionError::Transport {
                detail: e.to_string(),
            }
        }
    }
}

impl VisionExtractor for ChatCompletionsClient {
    async fn extract(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
        prompt: &str,
    ) -> Result<String, VisionError> {
        let body = self.build_request(first, second, prompt);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        debug!("Vision reply: HTTP {}, {} bytes", status, text.len());

        if !status.is_success() {
            return Err(VisionError::Transport {
                detail: format!("HTTP {}: {}", status, truncate(&text, 300)),
            });
        }

        reply_content(&text)
    }
}

/// Pull the first choice's message content out of a reply body.
pub fn reply_content(body: &str) -> Result<String, VisionError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| VisionError::MalformedApiResponse {
            detail: format!("reply is not a chat-completions envelope: {e}"),
        })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| VisionError::MalformedApiResponse {
            detail: "reply contains no choices".into(),
        })?;

    choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| VisionError::MalformedApiResponse {
            detail: "first choice has no message content".into(),
        })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── edgequake-llm provider backend ───────────────────────────────────────────

/// Routes requests through an [`LLMProvider`].
#[derive(Clone)]
pub struct ProviderExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl ProviderExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl VisionExtractor for ProviderExtractor {
    async fn extract(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
        prompt: &str,
    ) -> Result<String, VisionError> {
        let images = vec![
            ImageData::new(first.data.clone(), first.mime_type),
            ImageData::new(second.data.clone(), second.mime_type),
        ];
        let messages = vec![ChatMessage::user_with_images(prompt, images)];
        let options = self.options();

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| VisionError::Timeout {
            secs: self.timeout_secs,
        })?
        .map_err(|e| VisionError::Transport {
            detail: format!("{e}"),
        })?;

        debug!(
            "Vision reply: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        // The provider hides the envelope; an empty completion is the only
        // sign of a reply without content.
        if response.content.trim().is_empty() {
            return Err(VisionError::MalformedApiResponse {
                detail: "provider returned an empty completion".into(),
            });
        }
        Ok(response.content)
    }
}

// ── Backend selection ────────────────────────────────────────────────────────

/// The vision backend chosen from an [`ExtractionConfig`].
#[derive(Clone)]
pub enum VisionBackend {
    ChatCompletions(ChatCompletionsClient),
    Provider(ProviderExtractor),
}

impl VisionBackend {
    /// Resolve the backend, from most-specific to least-specific:
    ///
    /// 1. a pre-built provider (`config.provider`)
    /// 2. a named edgequake-llm provider (`config.provider_name`) with `config.model`
    /// 3. the direct client with `config.api_key`
    /// 4. the direct client with `OPENAI_API_KEY`
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, FormExtractError> {
        if let Some(ref provider) = config.provider {
            info!("Vision backend: injected provider");
            return Ok(Self::Provider(ProviderExtractor::new(
                Arc::clone(provider),
                config,
            )));
        }

        if let Some(ref name) = config.provider_name {
            let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(
                |e| FormExtractError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                },
            )?;
            info!("Vision backend: provider '{}' ({})", name, config.model);
            return Ok(Self::Provider(ProviderExtractor::new(provider, config)));
        }

        let key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| FormExtractError::ProviderNotConfigured {
                provider: "chat-completions".into(),
                hint: "Set OPENAI_API_KEY, pass an API key, or name an edgequake-llm provider."
                    .into(),
            })?;

        info!(
            "Vision backend: chat-completions at {} ({})",
            config.endpoint, config.model
        );
        Ok(Self::ChatCompletions(ChatCompletionsClient::new(key, config)?))
    }
}

impl VisionExtractor for VisionBackend {
    async fn extract(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
        prompt: &str,
    ) -> Result<String, VisionError> {
        match self {
            Self::ChatCompletions(client) => client.extract(first, second, prompt).await,
            Self::Provider(provider) => provider.extract(first, second, prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatCompletionsClient {
        ChatCompletionsClient::new("sk-test", &ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn request_shape() {
        let client = client();
        let first = EncodedImage::from_jpeg(b"one");
        let second = EncodedImage::from_jpeg(b"two");
        let body = serde_json::to_value(client.build_request(&first, &second, "PROMPT")).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1000);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");

        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "PROMPT");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], first.data_uri());
        assert_eq!(content[2]["image_url"]["url"], second.data_uri());
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn reads_first_choice_content() {
        let body = r#"{"id":"x","choices":[
            {"index":0,"message":{"role":"assistant","content":"First Name: Jane"}},
            {"index":1,"message":{"role":"assistant","content":"ignored"}}
        ]}"#;
        assert_eq!(reply_content(body).unwrap(), "First Name: Jane");
    }

    #[test]
    fn malformed_envelopes() {
        for body in [
            "not json",
            r#"{"error":{"message":"bad"}}"#,
            r#"{"choices":[]}"#,
            r#"{"choices":[{"index":0}]}"#,
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
        ] {
            let err = reply_content(body).unwrap_err();
            assert!(
                matches!(err, VisionError::MalformedApiResponse { .. }),
                "{body} → {err:?}"
            );
        }
    }

    #[test]
    fn debug_hides_api_key() {
        assert!(!format!("{:?}", client()).contains("sk-test"));
    }

    #[test]
    fn backend_from_explicit_key() {
        let config = ExtractionConfig::builder().api_key("sk-abc").build().unwrap();
        assert!(matches!(
            VisionBackend::from_config(&config),
            Ok(VisionBackend::ChatCompletions(_))
        ));
    }

    #[test]
    fn truncate_long_bodies() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc\u{2026}");
    }
}
