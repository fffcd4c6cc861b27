use super::parse::extract_code;
use crate::config::LlmConfig;
use crate::sanitize;
use crate::types::{Candidate, Harness};
use crate::util::truncate;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate limit retry configuration
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;
const MAX_BACKOFF_MS: u64 = 60_000;

const ERROR_BODY_MAX_CHARS: usize = 200;

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<Message<'a>>,
    model: &'a str,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl GenerationClient {
    pub fn new(config: LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Ask for one candidate. Any transport or shape failure is logged and yields `None`.
    pub async fn generate(&self, prompt: &str, harness: &Harness) -> Option<Candidate> {
        match self.complete(prompt).await {
            Ok(reply) => Some(sanitize::clean(extract_code(&reply), harness)),
            Err(err) => {
                tracing::warn!("error querying LLM: {err:#}");
                None
            }
        }
    }

    /// Send `prompt` as a single user message and return the trimmed reply text.
    pub async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            model: &self.config.model,
            temperature: self.config.temperature,
        };

        let mut retry_count = 0;
        loop {
            let mut builder = self
                .http
                .post(&self.config.api_url)
                .header("Content-Type", "application/json")
                .json(&request);
            if let Some(key) = self.config.api_key.as_deref() {
                builder = builder.bearer_auth(key);
            }

            let response = builder
                .send()
                .await
                .with_context(|| format!("Request to {} failed", self.config.api_url))?;
            let status = response.status();
            let text = response.text().await.context("Failed to read response body")?;

            if status.is_success() {
                return parse_reply(&text);
            }

            if status.as_u16() == 429 && retry_count < self.config.max_retries {
                retry_count += 1;
                let delay_ms = backoff_ms(retry_count);
                tracing::warn!(
                    attempt = retry_count,
                    max_retries = self.config.max_retries,
                    "rate limited, retrying in {}ms",
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                continue;
            }

            return Err(anyhow!(
                "API error {}: {}",
                status,
                truncate(&text, ERROR_BODY_MAX_CHARS)
            ));
        }
    }
}

fn parse_reply(body: &str) -> anyhow::Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        anyhow!(
            "Failed to parse completion response: {}\n{}",
            e,
            truncate(body, ERROR_BODY_MAX_CHARS)
        )
    })?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.trim().to_string())
        .ok_or_else(|| anyhow!("Completion response had no choices"))
}

/// Delay before retry number `attempt` (1-based), capped at `MAX_BACKOFF_MS`.
fn backoff_ms(attempt: u32) -> u64 {
    BACKOFF_MULTIPLIER
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| INITIAL_BACKOFF_MS.checked_mul(factor))
        .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS))
}
