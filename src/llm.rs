//! Chat model capability for answer synthesis.
//!
//! Auth failures get their own error variant: the engine treats a 401/403 as
//! terminal and disables synthesis for the rest of the process, while any
//! other failure only degrades the single request.

use std::fmt;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::LlmConfig;

/// Chat completion failure. [`ChatError::Auth`] means the credentials are
/// bad and retrying is pointless.
#[derive(Debug)]
pub enum ChatError {
    Auth(String),
    Other(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Auth(msg) => write!(f, "authentication failed: {}", msg),
            ChatError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// False for the null object; synthesis is skipped entirely then.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Whether [`ChatModel::stream`] produces incremental deltas. When
    /// false, callers fall back to completing and re-segmenting the result.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// One-shot completion.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError>;

    /// Stream a completion as text deltas into `tx`. Default implementation
    /// completes in one shot and sends the whole answer as a single delta.
    async fn stream(
        &self,
        system: &str,
        user: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(), ChatError> {
        let answer = self.complete(system, user).await?;
        let _ = tx.send(answer).await;
        Ok(())
    }
}

// ============ Disabled model ============

/// Null object used when `llm.provider = "disabled"`.
pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn is_enabled(&self) -> bool {
        false
    }
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ChatError> {
        Err(ChatError::Other("LLM provider is disabled".to_string()))
    }
}

// ============ OpenAI model ============

/// Calls `POST /v1/chat/completions` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiChat {
    model: String,
    timeout_secs: u64,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            timeout_secs: config.timeout_secs,
        })
    }

    fn client(&self) -> Result<reqwest::Client, ChatError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ChatError::Other(e.to_string()))
    }

    async fn send(
        &self,
        system: &str,
        user: &str,
        streaming: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ChatError::Auth("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": streaming,
        });

        let response = self
            .client()?
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Other(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Auth(format!("OpenAI API error {}: {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Other(format!("OpenAI API error {}: {}", status, text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError> {
        let response = self.send(system, user, false).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::Other(e.to_string()))?;
        parse_completion(&json)
    }

    async fn stream(
        &self,
        system: &str,
        user: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(), ChatError> {
        let mut response = self.send(system, user, true).await?;

        // The body is server-sent events; deltas arrive as `data: {...}`
        // lines and the stream ends with `data: [DONE]`. A data line may be
        // split across chunk boundaries, so buffer until a newline.
        let mut buffer = String::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ChatError::Other(e.to_string()))?
        {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    return Ok(());
                }
                match serde_json::from_str::<serde_json::Value>(payload) {
                    Ok(event) => {
                        if let Some(delta) = event
                            .pointer("/choices/0/delta/content")
                            .and_then(|c| c.as_str())
                        {
                            if !delta.is_empty() && tx.send(delta.to_string()).await.is_err() {
                                // Receiver hung up; stop reading.
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => debug!("Skipping unparseable SSE event: {}", e),
                }
            }
        }
        Ok(())
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_completion(json: &serde_json::Value) -> Result<String, ChatError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ChatError::Other("Invalid OpenAI response: missing content".to_string()))
}

/// Create the appropriate [`ChatModel`] for the configuration.
pub fn create_chat(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChat)),
        "openai" => Ok(Box::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
