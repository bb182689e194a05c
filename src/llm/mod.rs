//! LLM backends and the generation fallback service.

pub mod gemini;
pub mod groq;
pub mod provider;
pub mod service;
mod sse;
pub mod types;

pub use gemini::GeminiProvider;
pub use groq::GroqProvider;
pub use provider::LlmProvider;
pub use service::{Generation, ModelCandidate, GENERATION_APOLOGY, INSUFFICIENT_CONTEXT};
pub use types::{ChatMessage, ChatRequest};
