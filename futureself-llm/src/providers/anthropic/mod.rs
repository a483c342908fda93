//! Anthropic (Claude) provider implementation
//!
//! Letter generation over the Messages API.

pub mod client;
pub mod letter;
pub mod types;

pub use client::{AnthropicClient, AnthropicConfig};
pub use letter::AnthropicLetterGenerator;
