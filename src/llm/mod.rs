//! LLM module - Language Model integrations
//!
//! Provides the completion service abstraction with Ollama as the backend.

pub mod ollama;
pub mod traits;

pub use ollama::OllamaClient;
pub use traits::{GenerateOptions, LLMProvider, LLMResponse};
