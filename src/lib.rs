//! Lead Qualifier: conversational decision core for real-estate lead intake.

pub mod classify;
pub mod config;
pub mod content;
pub mod error;
pub mod flow;
pub mod llm;
pub mod rules;
pub mod turn;

pub use rules::UserProfile;
