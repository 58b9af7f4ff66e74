//! LLM client for the seeker runtime.
//!
//! Speaks the OpenAI-compatible chat-completions wire format (OpenRouter in
//! production) with SSE streaming, bounded exponential retry for transient
//! failures and token-usage reporting through a registered hook.

mod client;
mod error;
mod message;
mod openai;
mod retry;

pub use client::*;
pub use error::*;
pub use message::*;
pub use openai::*;
pub use retry::*;
