//! Human-face verification through a multimodal model.

use std::sync::Arc;
use std::time::Duration;

use ai_client::{Ollama, VisionAgent};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::VerdictError;
use crate::types::VerificationVerdict;

pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(45);

const VERIFY_PROMPT: &str = "\
Analyze this image and determine whether it contains a clear human face.
Respond with a single JSON object and nothing else, with exactly these keys:
- \"is_human_face\": boolean, true if a clear human face is present
- \"confidence\": number between 0.0 and 1.0
- \"reason\": string, a short explanation";

/// Decides whether image bytes show a plausible human photo.
///
/// Never fails: an unreachable model or an unusable reply is a negative
/// verdict whose reason says what went wrong.
#[async_trait]
pub trait AvatarVerifier: Send + Sync {
    async fn verify(&self, image: &[u8]) -> VerificationVerdict;
}

#[derive(Debug, Deserialize)]
struct WireVerdict {
    is_human_face: bool,
    confidence: f64,
    reason: String,
}

/// Parse the model's reply. It must be a single JSON object; all three keys
/// are required with their exact types, and confidence must lie in [0, 1].
pub fn parse_verdict(content: &str) -> Result<VerificationVerdict, VerdictError> {
    let value: serde_json::Value = serde_json::from_str(content.trim())?;
    if !value.is_object() {
        return Err(VerdictError::NotAnObject);
    }
    let wire: WireVerdict = serde_json::from_value(value)?;
    if !(0.0..=1.0).contains(&wire.confidence) {
        return Err(VerdictError::ConfidenceOutOfRange(wire.confidence));
    }
    Ok(VerificationVerdict {
        is_human_face: wire.is_human_face,
        confidence: wire.confidence,
        reason: wire.reason,
    })
}

/// Verifier backed by any [`VisionAgent`].
#[derive(Clone)]
pub struct VisionVerifier {
    agent: Arc<dyn VisionAgent>,
}

impl VisionVerifier {
    pub fn new(agent: Arc<dyn VisionAgent>) -> Self {
        Self { agent }
    }

    /// Verifier talking to an Ollama server with the settings the verdict
    /// format needs: JSON output, low temperature, short replies.
    pub fn ollama(base_url: &str, model: &str) -> Self {
        let agent = Ollama::new(model)
            .with_base_url(base_url)
            .with_timeout(VERIFY_TIMEOUT)
            .json_output()
            .with_temperature(0.1)
            .with_num_predict(128);
        Self::new(Arc::new(agent))
    }
}

#[async_trait]
impl AvatarVerifier for VisionVerifier {
    async fn verify(&self, image: &[u8]) -> VerificationVerdict {
        let model = self.agent.model();
        info!(model, bytes = image.len(), "Requesting face verification");

        let content = match self.agent.describe_image(VERIFY_PROMPT, image).await {
            Ok(content) => content,
            Err(e) => {
                warn!(model, error = %e, "Vision request failed");
                return VerificationVerdict::failed(format!("verification request failed: {e}"));
            }
        };

        match parse_verdict(&content) {
            Ok(verdict) => {
                info!(
                    is_human_face = verdict.is_human_face,
                    confidence = verdict.confidence,
                    valid = verdict.is_valid(),
                    reason = %verdict.reason,
                    "Vision verdict"
                );
                verdict
            }
            Err(e) => {
                warn!(model, error = %e, raw = %content, "Unusable vision verdict");
                VerificationVerdict::failed(e.to_string())
            }
        }
    }
}
