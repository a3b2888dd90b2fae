//! Tolerant parsing of classifier output.
//!
//! The model's reply is untrusted free text that usually contains JSON.
//! [`parse_classification`] never fails: anything it can't use is replaced
//! by a default.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::{
    ClassificationResult, Correction, DEFAULT_EXTRACTION_CONFIDENCE, DEFAULT_INTENT_CONFIDENCE,
    ExtractionItem, IntentClassification, ObjectionType, PrimaryIntent, Tone,
};

/// Parse a raw model reply into a well-formed classification.
pub fn parse_classification(raw: &str) -> ClassificationResult {
    let Some(root) = first_json_object(raw) else {
        warn!(raw_response = %raw, "No JSON object in classifier reply, using fallback");
        return ClassificationResult::fallback();
    };

    let intent = parse_intent(root.get("intent"));
    let extracted = parse_extracted(root.get("extracted"));
    let correction = parse_correction(root.get("correction"));

    debug!(
        intent = %intent.primary,
        extracted = extracted.len(),
        correction = correction.is_some(),
        "Parsed classifier reply"
    );

    ClassificationResult {
        intent,
        extracted,
        correction,
    }
}

/// Numeric confidence clamped to [0, 1], or `default` when missing or not a
/// finite number.
fn confidence(obj: &Map<String, Value>, default: f64) -> f64 {
    obj.get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(default)
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Field values may come back as numbers or booleans; keep their text form.
fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_intent(value: Option<&Value>) -> IntentClassification {
    let Some(obj) = value.and_then(Value::as_object) else {
        return ClassificationResult::fallback().intent;
    };

    let primary = match non_empty_str(obj, "primary") {
        Some(raw) => PrimaryIntent::parse(raw).unwrap_or_else(|| {
            debug!(primary = raw, "Unknown intent, treating as clarification");
            PrimaryIntent::ClarificationQuestion
        }),
        None => PrimaryIntent::ClarificationQuestion,
    };

    IntentClassification {
        primary,
        objection: non_empty_str(obj, "objection").and_then(ObjectionType::parse),
        confidence: confidence(obj, DEFAULT_INTENT_CONFIDENCE),
        suggested_tone: non_empty_str(obj, "suggestedTone").and_then(Tone::parse),
    }
}

fn parse_extracted(value: Option<&Value>) -> Vec<ExtractionItem> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let mapping_key = non_empty_str(obj, "mappingKey")?;
            let value = value_text(obj.get("value"))?;
            Some(ExtractionItem {
                mapping_key: mapping_key.to_string(),
                value,
                confidence: confidence(obj, DEFAULT_EXTRACTION_CONFIDENCE),
            })
        })
        .collect()
}

fn parse_correction(value: Option<&Value>) -> Option<Correction> {
    let obj = value?.as_object()?;
    let mapping_key = non_empty_str(obj, "mappingKey")?;
    let new_value = value_text(obj.get("newValue"))?;
    Some(Correction {
        mapping_key: mapping_key.to_string(),
        new_value,
    })
}

/// Body of the first markdown code fence, if the reply has one.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip an info string such as `json` on the opening fence line.
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// The first complete JSON object in `text`.
///
/// Scanning stops at the end of that object, so trailing prose or a second
/// object after it is ignored. A `{` that doesn't start valid JSON is
/// skipped and the search continues from the next one.
fn object_in(text: &str) -> Option<Map<String, Value>> {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find('{') {
        let start = offset + pos;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(obj))) = stream.next() {
            return Some(obj);
        }
        offset = start + 1;
    }
    None
}

/// Locate the classification object in a model reply.
///
/// A fenced block wins when it holds an object; otherwise the whole reply
/// is searched.
pub(crate) fn first_json_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    fenced_body(trimmed)
        .and_then(object_in)
        .or_else(|| object_in(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_reply() {
        let raw = r#"{
            "intent": {"primary": "multi_answer", "objection": null, "confidence": 0.92, "suggestedTone": "educational"},
            "extracted": [
                {"mappingKey": "timeline", "value": "0-3", "confidence": 0.9},
                {"mappingKey": "budget", "value": "500000", "confidence": 0.65}
            ],
            "correction": null
        }"#;
        let result = parse_classification(raw);
        assert_eq!(result.intent.primary, PrimaryIntent::MultiAnswer);
        assert!(result.intent.objection.is_none());
        assert!((result.intent.confidence - 0.92).abs() < 1e-9);
        assert_eq!(result.intent.suggested_tone, Some(Tone::Educational));
        assert_eq!(result.extracted.len(), 2);
        assert_eq!(result.extracted[1], ExtractionItem::new("budget", "500000", 0.65));
        assert!(result.correction.is_none());
    }

    #[test]
    fn objection_reply() {
        let raw = r#"{"intent": {"primary": "objection", "objection": "privacy_refusal", "confidence": 0.8}, "extracted": []}"#;
        let result = parse_classification(raw);
        assert_eq!(result.intent.primary, PrimaryIntent::Objection);
        assert_eq!(result.intent.objection, Some(ObjectionType::PrivacyRefusal));
    }

    #[test]
    fn garbage_yields_fallback() {
        for raw in ["", "I'm not sure what you mean", "[1, 2, 3]", "{not json", "null"] {
            assert_eq!(parse_classification(raw), ClassificationResult::fallback(), "input: {raw:?}");
        }
    }

    #[test]
    fn missing_primary_defaults_to_clarification() {
        let result = parse_classification(r#"{"intent": {"confidence": 0.9}, "extracted": []}"#);
        assert_eq!(result.intent.primary, PrimaryIntent::ClarificationQuestion);
        assert!((result.intent.confidence - 0.9).abs() < 1e-9);

        let result = parse_classification(r#"{"extracted": []}"#);
        assert_eq!(result.intent.primary, PrimaryIntent::ClarificationQuestion);
        assert_eq!(result.intent.confidence, DEFAULT_INTENT_CONFIDENCE);
    }

    #[test]
    fn unknown_vocabulary_is_tolerated() {
        let raw = r#"{"intent": {"primary": "rant", "objection": "too_pushy", "suggestedTone": "sarcastic"}}"#;
        let result = parse_classification(raw);
        assert_eq!(result.intent.primary, PrimaryIntent::ClarificationQuestion);
        assert!(result.intent.objection.is_none());
        assert!(result.intent.suggested_tone.is_none());
    }

    #[test]
    fn non_numeric_confidences_default() {
        let raw = r#"{
            "intent": {"primary": "direct_answer", "confidence": "high"},
            "extracted": [{"mappingKey": "timeline", "value": "0-3", "confidence": "very"},
                          {"mappingKey": "budget", "value": "1"}]
        }"#;
        let result = parse_classification(raw);
        assert_eq!(result.intent.confidence, DEFAULT_INTENT_CONFIDENCE);
        assert_eq!(result.extracted[0].confidence, DEFAULT_EXTRACTION_CONFIDENCE);
        assert_eq!(result.extracted[1].confidence, DEFAULT_EXTRACTION_CONFIDENCE);
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = r#"{"intent": {"primary": "direct_answer", "confidence": 1.7},
                     "extracted": [{"mappingKey": "a", "value": "b", "confidence": -2}]}"#;
        let result = parse_classification(raw);
        assert_eq!(result.intent.confidence, 1.0);
        assert_eq!(result.extracted[0].confidence, 0.0);
    }

    #[test]
    fn incomplete_extractions_are_dropped() {
        let raw = r#"{"intent": {"primary": "direct_answer"}, "extracted": [
            {"mappingKey": "", "value": "x"},
            {"mappingKey": "budget"},
            {"mappingKey": "budget", "value": "   "},
            {"value": "orphan"},
            "not an object",
            {"mappingKey": "bedrooms", "value": 3, "confidence": 0.9},
            {"mappingKey": "pre_approved", "value": true}
        ]}"#;
        let result = parse_classification(raw);
        let pairs: Vec<(&str, &str)> = result
            .extracted
            .iter()
            .map(|e| (e.mapping_key.as_str(), e.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("bedrooms", "3"), ("pre_approved", "true")]);
    }

    #[test]
    fn extracted_not_a_list_is_empty() {
        let result = parse_classification(r#"{"intent": {"primary": "chitchat"}, "extracted": {"a": 1}}"#);
        assert_eq!(result.intent.primary, PrimaryIntent::Chitchat);
        assert!(result.extracted.is_empty());
    }

    #[test]
    fn correction_requires_mapping_key() {
        let ok = parse_classification(
            r#"{"intent": {"primary": "change_previous_answer"}, "correction": {"mappingKey": "budget", "newValue": "650000"}}"#,
        );
        assert_eq!(
            ok.correction,
            Some(Correction {
                mapping_key: "budget".into(),
                new_value: "650000".into()
            })
        );

        for raw in [
            r#"{"correction": {"mappingKey": "", "newValue": "1"}}"#,
            r#"{"correction": {"mappingKey": 7, "newValue": "1"}}"#,
            r#"{"correction": {"newValue": "1"}}"#,
            r#"{"correction": {"mappingKey": "budget"}}"#,
            r#"{"correction": "budget"}"#,
        ] {
            assert!(parse_classification(raw).correction.is_none(), "input: {raw}");
        }
    }

    #[test]
    fn reply_wrapped_in_markdown() {
        let raw = "Here you go:\n```json\n{\"intent\": {\"primary\": \"off_topic\"}, \"extracted\": []}\n```";
        assert_eq!(parse_classification(raw).intent.primary, PrimaryIntent::OffTopic);
    }

    #[test]
    fn reply_with_surrounding_text() {
        let raw = "Classification: {\"intent\": {\"primary\": \"escalation_request\"}} hope that helps";
        assert_eq!(
            parse_classification(raw).intent.primary,
            PrimaryIntent::EscalationRequest
        );
    }

    #[test]
    fn object_followed_by_prose() {
        let raw = "{\"intent\": {\"primary\": \"direct_answer\", \"confidence\": 0.9}, \
                   \"extracted\": [{\"mappingKey\": \"budget\", \"value\": \"500000\", \"confidence\": 0.9}]}\n\n\
                   Let me know if you need anything else.";
        let result = parse_classification(raw);
        assert_eq!(result.intent.primary, PrimaryIntent::DirectAnswer);
        assert_eq!(result.extracted, vec![ExtractionItem::new("budget", "500000", 0.9)]);
    }

    #[test]
    fn first_of_two_objects_wins() {
        let raw = r#"Result: {"intent": {"primary": "objection", "objection": "price_sensitivity"},
                     "extracted": [{"mappingKey": "timeline", "value": "3-6", "confidence": 0.8}]}
                     (alt: {"intent": {"primary": "chitchat"}, "extracted": []})"#;
        let result = parse_classification(raw);
        assert_eq!(result.intent.primary, PrimaryIntent::Objection);
        assert_eq!(result.intent.objection, Some(ObjectionType::PriceSensitivity));
        assert_eq!(result.extracted, vec![ExtractionItem::new("timeline", "3-6", 0.8)]);
    }

    #[test]
    fn stray_brace_before_object_is_skipped() {
        let raw = r#"Using {braces} loosely, here it is: {"intent": {"primary": "chitchat"}}"#;
        assert_eq!(parse_classification(raw).intent.primary, PrimaryIntent::Chitchat);
    }

    #[test]
    fn fenced_object_with_trailing_note() {
        let raw = "```json\n{\"intent\": {\"primary\": \"multi_answer\"}, \"extracted\": \
                   [{\"mappingKey\": \"bedrooms\", \"value\": 3}]}\n// bedrooms inferred\n```";
        let result = parse_classification(raw);
        assert_eq!(result.intent.primary, PrimaryIntent::MultiAnswer);
        assert_eq!(result.extracted[0].value, "3");
    }

    #[test]
    fn plain_fence_body() {
        let obj = first_json_object("```\n{\"a\": 1}\n```").unwrap();
        assert_eq!(obj["a"], 1);
        assert!(first_json_object("```\nnot json\n```").is_none());
    }
}
