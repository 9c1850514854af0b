//! Blocking chat client for remote reasoners
//!
//! Speaks the OpenAI-compatible `/v1/chat/completions` wire shape. The
//! decision core is synchronous, so calls block with separate connect and
//! read timeouts. Transport faults (connect failures, timeouts) retry with
//! bounded exponential backoff; non-2xx application responses are
//! immediately fatal and carry the response body for diagnosis.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::Duration;

/// Connection settings for the chat backend.
///
/// `api_base` and `api_key` are required at construction; there is no
/// deferred validation.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl ChatConfig {
    /// Read connection settings from `COUNCIL_API_BASE`, `COUNCIL_API_KEY`
    /// and `COUNCIL_MODEL`.
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("COUNCIL_API_BASE").unwrap_or_default(),
            api_key: std::env::var("COUNCIL_API_KEY").unwrap_or_default(),
            model: std::env::var("COUNCIL_MODEL").unwrap_or_else(|_| "deepseek-reasoner".to_string()),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// One message in the chat transcript.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

/// Blocking HTTP client for one chat backend.
pub struct ChatClient {
    config: ChatConfig,
    http: reqwest::blocking::Client,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        if config.api_base.is_empty() || config.api_key.is_empty() {
            bail!("chat client requires an API base URL and key (COUNCIL_API_BASE / COUNCIL_API_KEY)");
        }
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    /// Send a chat completion request and return the assistant's text.
    ///
    /// Retries only transient transport failures. A non-2xx status is an
    /// application error and fails at once with the body attached.
    pub fn chat(&self, messages: &[ChatMessage], temperature: f64, max_tokens: u32) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.api_base.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut attempt = 0u32;
        let response = loop {
            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send();

            match sent {
                Ok(resp) => break resp,
                Err(err) if attempt < self.config.max_retries => {
                    let delay = self.config.backoff_base * 2u32.pow(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "chat transport failure, retrying: {err}"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err).context("chat backend unreachable after retries");
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("chat backend returned {status}: {body}");
        }

        let json: serde_json::Value = response.json().context("chat response was not JSON")?;
        Ok(json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_fails_without_credentials() {
        let config = ChatConfig {
            api_base: String::new(),
            api_key: String::new(),
            model: "test".to_string(),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        };
        assert!(ChatClient::new(config).is_err());
    }

    #[test]
    fn construction_succeeds_with_credentials() {
        let config = ChatConfig {
            api_base: "https://api.example.com".to_string(),
            api_key: "k".to_string(),
            model: "test".to_string(),
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        };
        assert!(ChatClient::new(config).is_ok());
    }
}
