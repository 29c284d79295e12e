pub mod error;
pub mod ollama;
pub mod traits;

pub use error::AiError;
pub use ollama::Ollama;
pub use traits::{Message, MessageRole, VisionAgent};
