use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A chat message, optionally carrying raw image attachments.
///
/// Images are kept as raw bytes here; providers encode them for transport.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub images: Vec<Vec<u8>>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.images.push(image.into());
        self
    }
}

// =============================================================================
// VisionAgent Trait
// =============================================================================

/// A model that can answer a prompt about a single image.
///
/// Implementations return the raw text of the model's reply. Interpreting
/// that text is the caller's job.
#[async_trait]
pub trait VisionAgent: Send + Sync {
    async fn describe_image(&self, prompt: &str, image: &[u8]) -> Result<String>;

    /// Model identifier, for logging.
    fn model(&self) -> &str {
        "unknown"
    }
}
