//! LLM provider implementations

pub mod anthropic;
