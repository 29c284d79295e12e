mod client;
pub(crate) mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::AiError;
use crate::traits::{Message, VisionAgent};
use client::{OllamaClient, OLLAMA_DEFAULT_URL};
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);
const LOG_PREVIEW_CHARS: usize = 200;

// =============================================================================
// Ollama Agent
// =============================================================================

/// Chat agent for a model served by an Ollama instance.
///
/// The HTTP client is built on first use and reused by every later request,
/// including from clones.
#[derive(Clone)]
pub struct Ollama {
    pub(crate) model: String,
    base_url: String,
    timeout: Duration,
    temperature: Option<f64>,
    num_predict: Option<u32>,
    json_output: bool,
    client: Arc<OnceCell<OllamaClient>>,
}

impl Ollama {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: OLLAMA_DEFAULT_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            temperature: None,
            num_predict: None,
            json_output: false,
            client: Arc::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.client = Arc::default();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = Arc::default();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap on generated tokens.
    pub fn with_num_predict(mut self, num_predict: u32) -> Self {
        self.num_predict = Some(num_predict);
        self
    }

    /// Ask the server to constrain replies to JSON (`format: "json"`).
    pub fn json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn client(&self) -> Result<&OllamaClient, AiError> {
        self.client
            .get_or_try_init(|| async { OllamaClient::new(&self.base_url, self.timeout) })
            .await
    }

    pub(crate) fn build_request(&self, messages: &[Message]) -> ChatRequest {
        let mut request =
            ChatRequest::new(&self.model).messages(messages.iter().map(WireMessage::from));
        if self.json_output {
            request = request.json_format();
        }
        if self.temperature.is_some() || self.num_predict.is_some() {
            request = request.options(ChatOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            });
        }
        request
    }

    /// Send a non-streaming chat and return the assistant's reply text.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, AiError> {
        let request = self.build_request(messages);
        let response = self.client().await?.chat(&request).await?;
        let text = response.text().ok_or(AiError::EmptyResponse)?;
        debug!(model = %self.model, reply = %preview(&text), "Ollama reply");
        Ok(text)
    }
}

#[async_trait]
impl VisionAgent for Ollama {
    async fn describe_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let message = Message::user(prompt).with_image(image);
        Ok(self.chat(&[message]).await?)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
