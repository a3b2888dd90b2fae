//! Turn processor: one user message in, one decision out.
//!
//! Flow:
//! 1. Classifier (the only async step) → intent + extractions
//! 2. Objection handling → scripted counter, if any
//! 3. State machine → merged profile, advanced context
//! 4. Content matching → advice and action steps for the new profile

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{
    ClassificationRequest, ClassificationResult, Classifier, ExtractionItem, PrimaryIntent,
};
use crate::config::EngineConfig;
use crate::content::{ContentItem, match_content};
use crate::flow::{
    AdvancementResult, StateMachineConfig, StateMachineContext, get_objection_counter,
    get_prompt_variant, process_extraction,
};
use crate::llm::ChatMessage;

/// Everything the caller needs to render the assistant's reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub classification: ClassificationResult,
    pub advancement: AdvancementResult,
    /// Scripted objection reply. `None` with an objection intent means the
    /// caller should answer generically.
    pub objection_response: Option<String>,
    /// Prompt for the state the conversation landed on.
    pub next_prompt: Option<String>,
    pub content: Vec<ContentItem>,
    /// The user asked for a human.
    pub escalate: bool,
    pub processed_at: DateTime<Utc>,
}

/// Runs the per-turn pipeline for one flow's sessions.
///
/// Turns for a single session must be processed one at a time; the caller
/// persists `advancement.context` and passes it back in on the next turn.
pub struct TurnProcessor {
    classifier: Arc<dyn Classifier>,
    catalog: Vec<ContentItem>,
    settings: EngineConfig,
}

impl TurnProcessor {
    pub fn new(classifier: Arc<dyn Classifier>, catalog: Vec<ContentItem>, settings: EngineConfig) -> Self {
        Self {
            classifier,
            catalog,
            settings,
        }
    }

    /// Process a single user message.
    ///
    /// Never fails: a classifier error degrades to the fallback
    /// classification, which keeps the user in the current state and counts
    /// the turn as an attempt.
    pub async fn process_turn(
        &self,
        config: &StateMachineConfig,
        context: &StateMachineContext,
        history: &[ChatMessage],
        message: &str,
    ) -> TurnOutcome {
        info!(
            flow = %config.flow,
            state = %context.current_state_id,
            "Processing turn"
        );

        let request = ClassificationRequest::build(
            config,
            context,
            history,
            message,
            self.settings.context_turns,
        );
        let classification = match self.classifier.classify(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, state = %context.current_state_id, "Classifier failed, using fallback");
                ClassificationResult::fallback()
            }
        };

        let mut extractions = classification.extracted.clone();
        if let Some(ref correction) = classification.correction {
            debug!(key = %correction.mapping_key, "Applying correction");
            extractions.push(ExtractionItem::new(&correction.mapping_key, &correction.new_value, 1.0));
        }

        let mut working = context.clone();
        let objection_response = match classification.intent.objection {
            Some(objection) if classification.intent.primary == PrimaryIntent::Objection => {
                let count = working.objection_attempts.entry(objection).or_insert(0);
                *count += 1;
                let response =
                    get_objection_counter(config, &context.current_state_id, objection, *count);
                debug!(
                    objection = %objection,
                    attempt = *count,
                    scripted = response.is_some(),
                    "Objection raised"
                );
                response.map(str::to_string)
            }
            _ => None,
        };

        let advancement = process_extraction(config, &working, &extractions);

        let next_prompt = config.state(&advancement.new_state_id).map(|state| {
            get_prompt_variant(state, advancement.context.attempts(&state.id)).to_string()
        });

        let content: Vec<ContentItem> = match_content(
            &self.catalog,
            &advancement.context.user_input,
            config.flow,
            self.settings.content_limit,
        )
        .into_iter()
        .map(|m| m.item.clone())
        .collect();

        let escalate = classification.intent.primary == PrimaryIntent::EscalationRequest;
        if escalate {
            info!(state = %advancement.new_state_id, "User asked for a human");
        }

        TurnOutcome {
            classification,
            advancement,
            objection_response,
            next_prompt,
            content,
            escalate,
            processed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::classify::{Correction, IntentClassification, ObjectionType};
    use crate::content::{ApplicableWhen, ContentKind};
    use crate::error::{ClassifyError, LlmError};
    use crate::flow::{
        ConversationState, FieldSpec, Flow, ObjectionCounter, StateType, TransitionCondition,
    };
    use crate::rules::{ConditionRule, Operator, RuleGroup};

    /// Classifier that replays a queue of canned results.
    struct ScriptedClassifier {
        replies: Mutex<VecDeque<Result<ClassificationResult, ClassifyError>>>,
        seen: Mutex<Vec<ClassificationRequest>>,
    }

    impl ScriptedClassifier {
        fn new(replies: Vec<Result<ClassificationResult, ClassifyError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(
            &self,
            request: &ClassificationRequest,
        ) -> Result<ClassificationResult, ClassifyError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ClassificationResult::fallback()))
        }
    }

    fn reply(primary: PrimaryIntent, extracted: &[(&str, &str, f64)]) -> ClassificationResult {
        ClassificationResult {
            intent: IntentClassification {
                primary,
                objection: None,
                confidence: 0.9,
                suggested_tone: None,
            },
            extracted: extracted
                .iter()
                .map(|(k, v, c)| ExtractionItem::new(k, v, *c))
                .collect(),
            correction: None,
        }
    }

    fn objection(kind: ObjectionType) -> ClassificationResult {
        let mut result = reply(PrimaryIntent::Objection, &[]);
        result.intent.objection = Some(kind);
        result
    }

    fn flow() -> StateMachineConfig {
        let data = TransitionCondition::DataCollected { fields: vec![] };
        let mut config = StateMachineConfig::new(
            Flow::Buy,
            "timeline",
            vec![
                ConversationState::new("timeline", 0, StateType::DataCollection, "When are you looking to buy?")
                    .with_collects(vec![FieldSpec::required("timeline", "Timeline")])
                    .with_transition(data.clone(), "budget", 1)
                    .with_objection_counter(ObjectionCounter {
                        objection_type: ObjectionType::NotReady,
                        response: "No pressure, even a rough idea helps.".into(),
                        escalation_response: Some("Totally fine. Is this year or next more likely?".into()),
                    }),
                ConversationState::new("budget", 1, StateType::DataCollection, "What's your budget?")
                    .with_collects(vec![FieldSpec::required("budget", "Budget")])
                    .with_prompt_variants(&["Even a ballpark works."])
                    .with_transition(data, "contact", 1),
                ConversationState::new("contact", 2, StateType::LeadCapture, "Best email to reach you?"),
            ],
        );
        config.lead_capture_state_id = Some("contact".into());
        config
    }

    fn catalog() -> Vec<ContentItem> {
        vec![
            ContentItem::new("first-time-buyer-guide", ContentKind::Advice, "First-time buyer guide", 1),
            ContentItem::new("preapproval", ContentKind::ActionStep, "Get pre-approved", 0).with_applicable_when(
                ApplicableWhen {
                    flow: Some(vec![Flow::Buy]),
                    rule_groups: Some(vec![RuleGroup::all(vec![
                        ConditionRule::new("timeline", Operator::Equals, "0-3").into(),
                        ConditionRule::new("budget", Operator::GreaterThan, "300000").into(),
                    ])]),
                    min_match_score: None,
                },
            ),
            ContentItem::new("listing-prep", ContentKind::ActionStep, "Prep your listing", 0).with_applicable_when(
                ApplicableWhen {
                    flow: Some(vec![Flow::Sell]),
                    ..Default::default()
                },
            ),
        ]
    }

    fn processor(replies: Vec<Result<ClassificationResult, ClassifyError>>) -> (TurnProcessor, Arc<ScriptedClassifier>) {
        let classifier = Arc::new(ScriptedClassifier::new(replies));
        let processor = TurnProcessor::new(classifier.clone(), catalog(), EngineConfig::default());
        (processor, classifier)
    }

    #[tokio::test]
    async fn multi_answer_reaches_lead_capture_with_content() {
        let (processor, _) = processor(vec![Ok(reply(
            PrimaryIntent::MultiAnswer,
            &[("timeline", "0-3", 0.9), ("budget", "450000", 0.85)],
        ))]);
        let config = flow();
        let context = StateMachineContext::new(&config);

        let outcome = processor
            .process_turn(&config, &context, &[], "within 3 months, around 450k")
            .await;

        assert_eq!(outcome.advancement.new_state_id, "contact");
        assert_eq!(outcome.advancement.skipped_states, vec!["budget"]);
        assert!(outcome.advancement.is_complete);
        assert_eq!(outcome.advancement.progress, 100);
        assert_eq!(outcome.next_prompt.as_deref(), Some("Best email to reach you?"));
        let ids: Vec<&str> = outcome.content.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["preapproval", "first-time-buyer-guide"]);
        assert!(!outcome.escalate);
        assert!(outcome.objection_response.is_none());
    }

    #[tokio::test]
    async fn classifier_failure_keeps_state_and_counts_attempt() {
        let (processor, _) = processor(vec![Err(ClassifyError::Llm(LlmError::Timeout {
            provider: "mock".into(),
            timeout: std::time::Duration::from_secs(30),
        }))]);
        let config = flow();
        let context = StateMachineContext::new(&config);

        let outcome = processor.process_turn(&config, &context, &[], "hmm").await;
        assert_eq!(outcome.classification, ClassificationResult::fallback());
        assert_eq!(outcome.advancement.new_state_id, "timeline");
        assert_eq!(outcome.advancement.context.attempts("timeline"), 1);
        assert_eq!(outcome.next_prompt.as_deref(), Some("When are you looking to buy?"));
    }

    #[tokio::test]
    async fn reask_uses_prompt_variant() {
        let (processor, _) = processor(vec![Ok(reply(PrimaryIntent::ClarificationQuestion, &[]))]);
        let config = flow();
        let mut context = StateMachineContext::new(&config);
        context.current_state_id = "budget".into();

        let outcome = processor
            .process_turn(&config, &context, &[], "what do you mean?")
            .await;
        assert_eq!(outcome.advancement.new_state_id, "budget");
        assert_eq!(outcome.next_prompt.as_deref(), Some("Even a ballpark works."));
    }

    #[tokio::test]
    async fn correction_overwrites_earlier_answer() {
        let mut result = reply(PrimaryIntent::ChangePreviousAnswer, &[("budget", "500000", 0.7)]);
        result.correction = Some(Correction {
            mapping_key: "budget".into(),
            new_value: "550000".into(),
        });
        let (processor, _) = processor(vec![Ok(result)]);
        let config = flow();
        let mut context = StateMachineContext::new(&config);
        context.current_state_id = "contact".into();
        context.user_input.insert("timeline".into(), "0-3".into());
        context.user_input.insert("budget".into(), "400000".into());

        let outcome = processor
            .process_turn(&config, &context, &[], "actually make that 550k")
            .await;
        assert_eq!(outcome.advancement.context.user_input["budget"], "550000");
        assert_eq!(outcome.advancement.context.user_input["timeline"], "0-3");
    }

    #[tokio::test]
    async fn repeated_objection_escalates() {
        let (processor, _) = processor(vec![
            Ok(objection(ObjectionType::NotReady)),
            Ok(objection(ObjectionType::NotReady)),
        ]);
        let config = flow();
        let context = StateMachineContext::new(&config);

        let first = processor.process_turn(&config, &context, &[], "not sure yet").await;
        assert_eq!(
            first.objection_response.as_deref(),
            Some("No pressure, even a rough idea helps.")
        );
        assert_eq!(
            first.advancement.context.objection_attempts[&ObjectionType::NotReady],
            1
        );

        let second = processor
            .process_turn(&config, &first.advancement.context, &[], "really not ready")
            .await;
        assert_eq!(
            second.objection_response.as_deref(),
            Some("Totally fine. Is this year or next more likely?")
        );
        assert_eq!(second.advancement.new_state_id, "timeline");
    }

    #[tokio::test]
    async fn objection_without_counter_is_generic() {
        let (processor, _) = processor(vec![Ok(objection(ObjectionType::TrustIssue))]);
        let config = flow();
        let outcome = processor
            .process_turn(&config, &StateMachineContext::new(&config), &[], "who are you?")
            .await;
        assert!(outcome.objection_response.is_none());
        assert_eq!(
            outcome.advancement.context.objection_attempts[&ObjectionType::TrustIssue],
            1
        );
    }

    #[tokio::test]
    async fn escalation_request_sets_flag() {
        let (processor, _) = processor(vec![Ok(reply(PrimaryIntent::EscalationRequest, &[]))]);
        let config = flow();
        let outcome = processor
            .process_turn(&config, &StateMachineContext::new(&config), &[], "let me talk to a person")
            .await;
        assert!(outcome.escalate);
    }

    #[tokio::test]
    async fn classifier_sees_history_and_current_prompt() {
        let (processor, classifier) = processor(vec![]);
        let config = flow();
        let history = vec![
            ChatMessage::assistant("When are you looking to buy?"),
            ChatMessage::user("soon"),
        ];
        processor
            .process_turn(&config, &StateMachineContext::new(&config), &history, "like next month")
            .await;

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state_prompt, "When are you looking to buy?");
        assert_eq!(seen[0].recent_context.len(), 2);
        assert_eq!(seen[0].user_message, "like next month");
    }
}
