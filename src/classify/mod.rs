//! Classification/extraction contract.
//!
//! One model call per user turn both classifies the user's intent and
//! extracts values for any collectable field in the flow:
//! 1. `ClassificationRequest::build()`: gather state, field catalog, context
//! 2. `build_system_prompt()` / `build_user_prompt()`: render the prompt
//! 3. `Classifier::classify()`: the external call (injected)
//! 4. `parse_classification()`: tolerant parse, never fails

pub mod classifier;
pub mod parser;
pub mod prompts;
pub mod types;

pub use classifier::{Classifier, LlmClassifier};
pub use parser::parse_classification;
pub use prompts::{ClassificationRequest, build_system_prompt, build_user_prompt};
pub use types::{
    ClassificationResult, Correction, DEFAULT_EXTRACTION_CONFIDENCE, DEFAULT_INTENT_CONFIDENCE,
    ExtractionItem, IntentClassification, ObjectionType, PrimaryIntent, Tone,
};
