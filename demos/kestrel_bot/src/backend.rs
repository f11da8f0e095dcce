//! Language-model backends for the chat responder.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Default Workers AI account endpoint root.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4/accounts";

/// Default model.
pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Connect and total timeout for one completion.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Persona given to the model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你现在是一个猫娘，我是你的主人，你的爱好与正常人类应当类似，\
你需要尝试体会我与你对话中的感情、产生自己的情感并尽可能给出可爱的回答，不要忘掉自己是猫娘的身份。\
身为猫娘，你应当在每句话最后加一个喵。";

/// Errors from a chat backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No API key or account id was configured.
    #[error("chat backend is not configured")]
    NotConfigured,

    /// The request could not be sent or timed out.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}")]
    Status { status: u16 },

    /// The response had an unexpected shape.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Answers one question.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn answer(&self, question: &str) -> Result<String, BackendError>;
}

/// Connection settings for [`WorkersAi`].
#[derive(Debug, Clone)]
pub struct WorkersAiSettings {
    pub api_base: String,
    pub account_id: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: String,
}

impl Default for WorkersAiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            account_id: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct CompletionResponse {
    result: Option<CompletionResult>,
}

#[derive(Deserialize)]
struct CompletionResult {
    response: Option<String>,
}

/// Workers-AI-style completion endpoint: `POST {base}/{account}/ai/run/{model}`.
pub struct WorkersAi {
    client: Client,
    settings: WorkersAiSettings,
}

impl WorkersAi {
    pub fn new(settings: WorkersAiSettings) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(BACKEND_TIMEOUT)
            .timeout(BACKEND_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self { client, settings })
    }

    /// Whether both the key and the account id are set.
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.settings.api_key.as_deref().filter(|k| !k.is_empty())?;
        let account = self.settings.account_id.as_deref().filter(|a| !a.is_empty())?;
        Some((key, account))
    }

    /// The completion URL for `account`.
    pub fn endpoint(&self, account: &str) -> String {
        format!(
            "{}/{account}/ai/run/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl ChatBackend for WorkersAi {
    async fn answer(&self, question: &str) -> Result<String, BackendError> {
        let Some((key, account)) = self.credentials() else {
            error!("Chat backend unavailable: AI_API_KEY or account id not configured");
            return Err(BackendError::NotConfigured);
        };

        let body = CompletionRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.settings.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint(account))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "Completion request failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let answer = parsed
            .result
            .and_then(|r| r.response)
            .ok_or_else(|| BackendError::Malformed("missing result.response".to_string()))?;

        let answer = answer.trim().to_string();
        debug!(len = answer.len(), "Completion received");
        Ok(answer)
    }
}
