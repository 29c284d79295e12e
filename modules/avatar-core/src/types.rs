use serde::{Deserialize, Serialize};

/// Verdicts below this confidence are never plausible, whatever the model
/// says about faces.
pub const PLAUSIBILITY_FLOOR: f64 = 0.6;

/// An image URL scraped from a homepage, ranked by how much it looks like a
/// profile photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateImage {
    pub url: String,
    pub score: i32,
    pub alt_text: String,
}

/// Structured answer from the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub is_human_face: bool,
    pub confidence: f64,
    pub reason: String,
}

impl VerificationVerdict {
    /// Negative verdict used whenever verification could not complete.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            is_human_face: false,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    /// Plausibility floor only. Acceptance is decided by the orchestrator
    /// against a stricter threshold.
    pub fn is_valid(&self) -> bool {
        self.is_human_face && self.confidence >= PLAUSIBILITY_FLOOR
    }
}

/// Boundary result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarResult {
    pub avatar_url: Option<String>,
}

impl AvatarResult {
    pub fn found(url: impl Into<String>) -> Self {
        Self {
            avatar_url: Some(url.into()),
        }
    }

    pub fn none() -> Self {
        Self { avatar_url: None }
    }
}

impl From<Option<String>> for AvatarResult {
    fn from(avatar_url: Option<String>) -> Self {
        Self { avatar_url }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_face_and_floor() {
        let verdict = |is_human_face, confidence| VerificationVerdict {
            is_human_face,
            confidence,
            reason: String::new(),
        };
        assert!(verdict(true, 0.6).is_valid());
        assert!(verdict(true, 0.95).is_valid());
        assert!(!verdict(true, 0.59).is_valid());
        assert!(!verdict(false, 0.99).is_valid());
    }

    #[test]
    fn failed_verdict_is_negative() {
        let verdict = VerificationVerdict::failed("timeout");
        assert!(!verdict.is_human_face);
        assert_eq!(verdict.confidence, 0.0);
        assert!(!verdict.is_valid());
        assert_eq!(verdict.reason, "timeout");
    }

    #[test]
    fn result_serializes_null_when_absent() {
        let json = serde_json::to_string(&AvatarResult::none()).unwrap();
        assert_eq!(json, r#"{"avatar_url":null}"#);
    }
}
