//! LLM integration seam.
//!
//! The crate ships no transport. Callers plug a concrete provider in through
//! [`LlmProvider`]; the classifier is the only consumer.

pub mod provider;

pub use provider::*;
