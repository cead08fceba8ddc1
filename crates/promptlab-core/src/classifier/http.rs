//! OpenAI-compatible chat-completions gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use serde_json::json;
use tracing::{debug, warn};

use super::{CategorySet, Classifier, ClassifierConfig};
use crate::error::{ClassifierError, ClassifierResult};
use crate::prompts::PromptSource;

const USER_AGENT_VALUE: &str = concat!("promptlab/", env!("CARGO_PKG_VERSION"));

/// Backoff ceiling between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Renders the prompt, calls the completions endpoint and normalizes the answer.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    config: ClassifierConfig,
    prompts: Arc<dyn PromptSource>,
    categories: CategorySet,
}

impl HttpClassifier {
    /// Fails with `ClassifierError::Config` when no API key is configured.
    pub fn new(
        config: ClassifierConfig,
        prompts: Arc<dyn PromptSource>,
        categories: CategorySet,
    ) -> ClassifierResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ClassifierError::Config {
                message: "no API key configured (set PROMPTLAB_CLASSIFIER_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            })?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| ClassifierError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            api_key,
            config,
            prompts,
            categories,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send with exponential backoff on retryable errors.
    async fn complete(&self, content: &str) -> ClassifierResult<String> {
        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            match self.complete_once(content).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        ClassifierError::RateLimited {
                            retry_after: Some(after),
                        } => *after,
                        _ => exponential_backoff(retries),
                    };
                    let backoff = backoff.min(MAX_BACKOFF);

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_secs = backoff.as_secs(),
                        "retrying classification request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, content: &str) -> ClassifierResult<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => {}
            401 | 403 => {
                return Err(ClassifierError::Unauthorized {
                    message: format!("HTTP {}", status.as_u16()),
                })
            }
            429 => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(ClassifierError::RateLimited { retry_after });
            }
            500..=599 => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                return Err(ClassifierError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                });
            }
            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                return Err(ClassifierError::InvalidResponse {
                    message: format!("HTTP {}: {}", status.as_u16(), message),
                });
            }
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ClassifierError::InvalidResponse {
                    message: e.to_string(),
                })?;

        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ClassifierError::InvalidResponse {
                message: "response missing choices[0].message.content".to_string(),
            })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str, prompt_id: &str) -> ClassifierResult<String> {
        let prompt = self
            .prompts
            .get(prompt_id)
            .await
            .map_err(|e| ClassifierError::Config {
                message: e.to_string(),
            })?
            .ok_or_else(|| ClassifierError::UnknownPrompt {
                prompt_id: prompt_id.to_string(),
            })?;

        let answer = self.complete(&prompt.render(text)).await?;
        let label = self.categories.normalize(&answer);
        debug!(prompt_id, answer = %answer.trim(), label = %label, "classified ticket");
        Ok(label)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// `2^retries` seconds, saturating at [`MAX_BACKOFF`].
fn exponential_backoff(retries: u32) -> Duration {
    1u64.checked_shl(retries)
        .map_or(MAX_BACKOFF, Duration::from_secs)
        .min(MAX_BACKOFF)
}
