//! Generative-text API access.
//!
//! [`gemini`] wraps the Gemini `generateContent` REST endpoint: one user
//! prompt in, the model's raw text out.

mod gemini;

pub use gemini::{GeminiClient, LlmError};
