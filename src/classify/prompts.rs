//! Classification request and prompt construction.

use serde::Serialize;

use super::types::{ObjectionType, PrimaryIntent, Tone};
use crate::flow::{FieldSpec, StateMachineConfig, StateMachineContext, get_prompt_variant};
use crate::llm::{ChatMessage, Role};
use crate::rules::UserProfile;

/// Max characters of the user's message sent to the model.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Max characters per context turn.
const MAX_CONTEXT_CHARS: usize = 300;

/// Everything the classifier needs for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest {
    pub state_id: String,
    pub state_goal: Option<String>,
    /// The question the user is answering.
    pub state_prompt: String,
    pub state_fields: Vec<FieldSpec>,
    /// Every collectable field in the flow, so multi-answers land correctly.
    pub field_catalog: Vec<FieldSpec>,
    /// Catalog fields already known.
    pub collected: UserProfile,
    pub recent_context: Vec<ChatMessage>,
    pub user_message: String,
}

impl ClassificationRequest {
    /// Build the request for the context's current state.
    ///
    /// Only the last `context_turns` user/assistant messages of `history` are
    /// kept. An unknown current state yields an empty state section rather
    /// than an error.
    pub fn build(
        config: &StateMachineConfig,
        context: &StateMachineContext,
        history: &[ChatMessage],
        user_message: &str,
        context_turns: usize,
    ) -> Self {
        let state = config.state(&context.current_state_id);
        let field_catalog: Vec<FieldSpec> = config.field_catalog().into_iter().cloned().collect();
        let collected: UserProfile = context
            .user_input
            .iter()
            .filter(|(key, _)| field_catalog.iter().any(|f| &f.mapping_key == *key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let dialogue: Vec<&ChatMessage> = history
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let skip = dialogue.len().saturating_sub(context_turns);
        let recent_context = dialogue.into_iter().skip(skip).cloned().collect();

        Self {
            state_id: context.current_state_id.clone(),
            state_goal: state.and_then(|s| s.goal.clone()),
            state_prompt: state
                .map(|s| get_prompt_variant(s, context.attempts(&s.id)).to_string())
                .unwrap_or_default(),
            state_fields: state.map(|s| s.collects.clone()).unwrap_or_default(),
            field_catalog,
            collected,
            recent_context,
            user_message: user_message.to_string(),
        }
    }
}

fn join_vocabulary<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items.into_iter().collect::<Vec<_>>().join(", ")
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn describe_field(field: &FieldSpec) -> String {
    let mut line = format!("- {} ({})", field.mapping_key, field.label);
    if let Some(ref hint) = field.extraction_hint {
        line.push_str(&format!(": {hint}"));
    }
    line
}

/// System prompt for the classification call.
pub fn build_system_prompt() -> String {
    let intents = join_vocabulary(PrimaryIntent::ALL.iter().map(PrimaryIntent::as_str));
    let objections = join_vocabulary(ObjectionType::ALL.iter().map(ObjectionType::as_str));
    let tones = join_vocabulary(Tone::ALL.iter().map(Tone::as_str));

    format!(
        "You classify a user's message in a lead-qualification conversation and extract \
         any field values it contains.\n\n\
         Intents (intent.primary): {intents}.\n\
         Objection types (intent.objection, only when primary is \"objection\"): {objections}.\n\
         Suggested tones (intent.suggestedTone, optional): {tones}.\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"intent\": {{\"primary\": \"...\", \"objection\": null, \"confidence\": 0.0, \"suggestedTone\": null}},\n \
         \"extracted\": [{{\"mappingKey\": \"...\", \"value\": \"...\", \"confidence\": 0.0}}],\n \
         \"correction\": null}}\n\n\
         Rules:\n\
         - Extract values for ANY field in the catalog, not just the current question\n\
         - Use only mappingKeys from the catalog\n\
         - Confidence is 0.0-1.0; be honest when the answer is vague\n\
         - Use \"correction\": {{\"mappingKey\": \"...\", \"newValue\": \"...\"}} only when the user \
         explicitly changes an earlier answer\n\
         - Omit extractions you are not sure about rather than guessing"
    )
}

/// User prompt rendering the request.
pub fn build_user_prompt(request: &ClassificationRequest) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("Current step: {}\n", request.state_id));
    if let Some(ref goal) = request.state_goal {
        prompt.push_str(&format!("Goal: {goal}\n"));
    }
    if !request.state_prompt.is_empty() {
        prompt.push_str(&format!("We asked: {}\n", request.state_prompt));
    }
    if !request.state_fields.is_empty() {
        prompt.push_str("Fields for this step:\n");
        for field in &request.state_fields {
            prompt.push_str(&describe_field(field));
            prompt.push('\n');
        }
    }

    if !request.field_catalog.is_empty() {
        prompt.push_str("\nField catalog:\n");
        for field in &request.field_catalog {
            prompt.push_str(&describe_field(field));
            prompt.push('\n');
        }
    }

    if !request.collected.is_empty() {
        prompt.push_str("\nAlready collected:\n");
        for (key, value) in &request.collected {
            prompt.push_str(&format!("- {key}: {value}\n"));
        }
    }

    if !request.recent_context.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for message in &request.recent_context {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            prompt.push_str(&format!(
                "{speaker}: {}\n",
                truncate(&message.content, MAX_CONTEXT_CHARS)
            ));
        }
    }

    prompt.push_str(&format!(
        "\nUser message:\n{}",
        truncate(&request.user_message, MAX_MESSAGE_CHARS)
    ));
    prompt
}
