use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LabelQaError;

pub(crate) const OPENAI_BASE: &str = "https://api.openai.com";
pub(crate) const OPENAI_BASE_ENV: &str = "LABELQA_OPENAI_BASE";
const OPENAI_API: &str = "openai";
const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
const OPENAI_MODEL_ENV: &str = "LABELQA_MODEL";
const OPENAI_DOCS_URL: &str = "https://platform.openai.com/api-keys";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 200;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationOptions {
    /// Defaults with the `LABELQA_MODEL` override applied.
    pub fn from_env() -> Self {
        let mut out = Self::default();
        if let Some(model) = crate::sources::env_secret(OPENAI_MODEL_ENV) {
            out.model = model;
        }
        out
    }

    pub fn validate(&self) -> Result<(), LabelQaError> {
        if self.model.trim().is_empty() {
            return Err(LabelQaError::InvalidArgument(
                "--model must not be empty".into(),
            ));
        }
        if self.max_tokens == 0 || self.max_tokens > 4096 {
            return Err(LabelQaError::InvalidArgument(
                "--max-tokens must be between 1 and 4096".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LabelQaError::InvalidArgument(
                "--temperature must be between 0.0 and 2.0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
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

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: String,
    options: GenerationOptions,
}

impl OpenAiClient {
    pub fn new(options: GenerationOptions) -> Result<Self, LabelQaError> {
        Self::with_key(options, crate::sources::env_secret(OPENAI_API_KEY_ENV))
    }

    fn with_key(options: GenerationOptions, api_key: Option<String>) -> Result<Self, LabelQaError> {
        options.validate()?;
        let Some(api_key) = api_key else {
            return Err(LabelQaError::ApiKeyRequired {
                api: OPENAI_API.into(),
                env_var: OPENAI_API_KEY_ENV.into(),
                docs_url: OPENAI_DOCS_URL.into(),
            });
        };
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(OPENAI_BASE, OPENAI_BASE_ENV),
            api_key,
            options,
        })
    }

    #[cfg(test)]
    fn new_for_test(
        base: String,
        api_key: &str,
        options: GenerationOptions,
    ) -> Result<Self, LabelQaError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            api_key: api_key.to_string(),
            options,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base.as_ref().trim_end_matches('/')
        )
    }

    /// Sends `prompt` as a single user message and returns the first choice's text.
    pub async fn complete(&self, prompt: &str) -> Result<String, LabelQaError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(LabelQaError::InvalidArgument(
                "Prompt must not be empty".into(),
            ));
        }

        let body = ChatRequest {
            model: &self.options.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        debug!(
            model = %self.options.model,
            max_tokens = self.options.max_tokens,
            "Requesting chat completion"
        );
        let req = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        // Completions are authenticated and non-deterministic; never cache them.
        let resp = crate::sources::fetch(req, OPENAI_API, true).await?;
        if !resp.status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&resp.body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| resp.excerpt());
            return Err(resp.status_error(OPENAI_API, &message));
        }

        let parsed: ChatResponse = resp.json(OPENAI_API)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LabelQaError::Api {
                api: OPENAI_API.to_string(),
                message: "No response content in chat completion".into(),
            })
    }
}

#[async_trait::async_trait]
impl crate::entities::label::AnswerGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LabelQaError> {
        self.complete(prompt).await
    }
}
