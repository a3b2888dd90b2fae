//! Content matcher: selects advice and action steps for a profile.

pub mod matcher;
pub mod model;

pub use matcher::{ContentMatch, match_content};
pub use model::{ApplicableWhen, ContentItem, ContentKind, DEFAULT_MIN_MATCH_SCORE, load_catalog};
