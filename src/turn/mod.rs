//! Per-turn orchestration: classify, handle objections, advance, match content.

pub mod processor;

pub use processor::{TurnOutcome, TurnProcessor};
