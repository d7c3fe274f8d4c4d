use crate::assessor::{AssessorError, SeverityAssessor};
use crate::config::AssessorConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SYSTEM_INSTRUCTION: &str = "You are an emergency department triage nurse. \
Rate the urgency of the case on the Korean Triage and Acuity Scale, where 1 is the most \
urgent and 5 the least. Answer with the digit, a semicolon, and one short sentence of \
rationale that contains no semicolon. Example: 2;Possible fracture with severe pain.";

/// Severity assessor backed by an OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct HttpSeverityAssessor {
    pub(crate) client: Client,
    pub(crate) endpoint: String,
    pub(crate) model: String,
    pub(crate) api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpSeverityAssessor {
    /// Create a new HTTP assessor
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    /// Build from the `[assessor]` section; the key comes from the named environment variable
    pub fn from_config(config: &AssessorConfig) -> Result<Self> {
        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "No assessor API key set, sending unauthenticated requests");
        }
        Self::new(&config.endpoint, &config.model, api_key)
    }
}

#[async_trait]
impl SeverityAssessor for HttpSeverityAssessor {
    fn name(&self) -> &str {
        "http"
    }

    async fn assess(&self, case_description: &str) -> std::result::Result<String, AssessorError> {
        let payload = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: case_description,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AssessorError::Unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssessorError::Unavailable(format!(
                "endpoint returned {}: {}",
                status, body
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssessorError::Unavailable(format!("unreadable response body: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AssessorError::Unavailable("response has no message content".to_string()))?;

        debug!(model = %self.model, response = %content, "Assessor answered");
        Ok(content)
    }
}
