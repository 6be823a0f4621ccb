//! Response normalization
//!
//! Turns raw model output into a [`ForensicRecord`]:
//! 1. a safety-blocked response becomes a fixed sentinel record
//! 2. markdown code fences (optionally tagged `json`) are stripped
//! 3. the remainder must parse as JSON, otherwise `ParseError`
//! 4. an answer wrapped in an extra envelope key is unwrapped
//! 5. fields are coerced into the record; a well-formed object never fails
//!
//! Everything after step 1 is pure.

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::gemini::InferenceResponse;
use crate::models::{CollisionType, ForensicRecord};

/// Key whose presence marks an object as the reconstruction itself.
const RECORD_KEY: &str = "scene_summary";
const FENCE: &str = "```";
const LANGUAGE_TAG: &str = "json";
const PREVIEW_CHARS: usize = 200;

pub const SAFETY_BLOCK_SUMMARY: &str =
    "AI SECURITY BLOCK: The evidence was flagged by the model's safety filters as too graphic or violent.";
pub const SAFETY_BLOCK_NARRATIVE: &str =
    "The AI refused to analyze this evidence due to safety constraints. Try a less graphic angle.";

/// Record returned in place of an analysis when the service refused to generate.
pub fn safety_blocked_record() -> ForensicRecord {
    ForensicRecord {
        scene_summary: SAFETY_BLOCK_SUMMARY.to_string(),
        collision_type: CollisionType::SafetyBlocked,
        severity_score: 0,
        pedestrians_detected: false,
        license_plates_detected: Vec::new(),
        vehicles_involved: Vec::new(),
        investigative_narrative: SAFETY_BLOCK_NARRATIVE.to_string(),
        timeline: None,
        video_meta: None,
        extra: Map::new(),
    }
}

/// Normalize a raw inference response. A safety block is a successful result.
pub fn normalize(response: &InferenceResponse) -> Result<ForensicRecord, ParseError> {
    if response.is_blocked() {
        warn!(
            "[normalize] Safety block ({}), returning sentinel record",
            response.block_reason().unwrap_or("unknown")
        );
        return Ok(safety_blocked_record());
    }
    normalize_text(response.text().unwrap_or_default())
}

/// Normalize already-extracted model text.
pub fn normalize_text(raw: &str) -> Result<ForensicRecord, ParseError> {
    let cleaned = strip_markdown_fence(raw);

    let value: Value = serde_json::from_str(cleaned).map_err(|source| {
        let preview: String = cleaned.chars().take(PREVIEW_CHARS).collect();
        warn!("[normalize] Model output is not JSON: {} ({:?})", source, preview);
        ParseError::InvalidJson { source, preview }
    })?;

    debug!("[normalize] Model output: {}", value);

    let object = match value {
        Value::Object(map) => map,
        // A bare one-element list around the answer is unwrapped like an envelope key.
        Value::Array(items) => match single_record(items) {
            Some(map) => map,
            None => return Err(ParseError::NotAnObject { kind: "array" }),
        },
        other => {
            return Err(ParseError::NotAnObject {
                kind: json_kind(&other),
            });
        }
    };

    Ok(ForensicRecord::from(recover_record(object)))
}

/// Strip a surrounding code fence and its `json` language tag, tolerating
/// whitespace around either. Text without a leading fence is only trimmed.
pub fn strip_markdown_fence(raw: &str) -> &str {
    let text = raw.trim();
    if !text.starts_with(FENCE) {
        return text;
    }

    let inner = text.trim_matches(|c: char| c == '`' || c.is_whitespace());
    match inner.get(..LANGUAGE_TAG.len()) {
        Some(tag) if tag.eq_ignore_ascii_case(LANGUAGE_TAG) => inner[LANGUAGE_TAG.len()..].trim(),
        _ => inner,
    }
}

/// If `object` lacks the record key, promote the first top-level value that is
/// an object containing it. Otherwise return `object` unchanged.
pub fn recover_record(mut object: Map<String, Value>) -> Map<String, Value> {
    if object.contains_key(RECORD_KEY) {
        return object;
    }

    let envelope_key = object
        .iter()
        .find(|(_, value)| is_record(value))
        .map(|(key, _)| key.clone());

    match envelope_key.and_then(|key| object.remove(&key).map(|value| (key, value))) {
        Some((key, Value::Object(inner))) => {
            debug!("[normalize] Recovered record nested under {:?}", key);
            inner
        }
        _ => object,
    }
}

fn is_record(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key(RECORD_KEY))
}

fn single_record(items: Vec<Value>) -> Option<Map<String, Value>> {
    let [Value::Object(map)]: [Value; 1] = items.try_into().ok()? else {
        return None;
    };
    Some(map)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::models::Vehicle;

    const RECORD_JSON: &str = r#"{
        "scene_summary": "Two cars collided at an intersection.",
        "collision_type": "Side-impact",
        "severity_score": 72,
        "pedestrians_detected": false,
        "license_plates_detected": ["KA-01-1234"],
        "vehicles_involved": [
            {"type": "car", "fault_percentage": 80, "reasoning": "Entered on red."},
            {"type": "suv", "fault_percentage": 20, "reasoning": "Excess speed."}
        ],
        "investigative_narrative": "Vehicle A entered the junction..."
    }"#;

    #[test]
    fn test_plain_json_record() {
        let record = normalize_text(RECORD_JSON).unwrap();
        assert_eq!(record.collision_type, CollisionType::SideImpact);
        assert_eq!(record.severity_score, 72);
        assert_eq!(record.license_plates_detected, vec!["KA-01-1234"]);
        assert_eq!(
            record.vehicles_involved[0],
            Vehicle {
                kind: "car".to_string(),
                fault_percentage: 80,
                reasoning: "Entered on red.".to_string(),
            }
        );
        assert!(record.timeline.is_none());
    }

    #[test]
    fn test_fenced_output_matches_bare_output() {
        let bare = normalize_text(RECORD_JSON).unwrap();
        for fenced in [
            format!("```json\n{}\n```", RECORD_JSON),
            format!("  \n```JSON\n{}\n```  \n", RECORD_JSON),
            format!("```\n{}\n```", RECORD_JSON),
            format!("```json {}```", RECORD_JSON),
        ] {
            assert_eq!(normalize_text(&fenced).unwrap(), bare, "{fenced}");
        }
    }

    #[test]
    fn test_strip_markdown_fence() {
        assert_eq!(strip_markdown_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fence("\r\n```json\r\n{}\r\n```\r\n"), "{}");
        assert_eq!(strip_markdown_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_markdown_fence("```"), "");
    }

    #[test]
    fn test_nested_record_is_recovered() {
        let record =
            normalize_text(r#"{"response": {"scene_summary": "x", "severity_score": 10}}"#).unwrap();
        assert_eq!(record.scene_summary, "x");
        assert_eq!(record.severity_score, 10);
    }

    #[test]
    fn test_first_nested_record_wins() {
        let record = normalize_text(
            r#"{"meta": 1, "b": {"scene_summary": "first"}, "a": {"scene_summary": "second"}}"#,
        )
        .unwrap();
        assert_eq!(record.scene_summary, "first");
    }

    #[test]
    fn test_object_without_record_key_is_used_as_is() {
        let record = normalize_text(r#"{"severity_score": 55, "data": {"other": true}}"#).unwrap();
        assert_eq!(record.severity_score, 55);
        assert_eq!(record.scene_summary, "");
        assert_eq!(record.collision_type, CollisionType::NotApplicable);
    }

    #[test]
    fn test_single_element_array_is_unwrapped() {
        let record = normalize_text(r#"[{"scene_summary": "x"}]"#).unwrap();
        assert_eq!(record.scene_summary, "x");

        assert_matches!(
            normalize_text(r#"[{"scene_summary": "x"}, {"scene_summary": "y"}]"#),
            Err(ParseError::NotAnObject { kind: "array" })
        );
    }

    #[test]
    fn test_not_json_is_parse_error() {
        assert_matches!(
            normalize_text("not json at all"),
            Err(ParseError::InvalidJson { preview, .. }) if preview == "not json at all"
        );
        assert_matches!(normalize_text(""), Err(ParseError::InvalidJson { .. }));
        assert_matches!(normalize_text("```json\n{\"scene_summary\": \n```"), Err(ParseError::InvalidJson { .. }));
    }

    #[test]
    fn test_scalar_json_is_rejected() {
        assert_matches!(normalize_text("42"), Err(ParseError::NotAnObject { kind: "number" }));
        assert_matches!(normalize_text("\"text\""), Err(ParseError::NotAnObject { kind: "string" }));
    }

    #[test]
    fn test_wrongly_typed_fields_still_normalize() {
        let record = normalize_text(r#"{"scene_summary": "x", "license_plates_detected": "None visible"}"#).unwrap();
        assert!(record.license_plates_detected.is_empty());

        let record = normalize_text(r#"{"scene_summary": "x", "pedestrians_detected": "no"}"#).unwrap();
        assert!(!record.pedestrians_detected);

        let record = normalize_text(r#"{"scene_summary": "x", "severity_score": "high"}"#).unwrap();
        assert_eq!(record.severity_score, 0);

        let record = normalize_text(r#"{"scene_summary": "x", "vehicles_involved": "two cars"}"#).unwrap();
        assert_eq!(record.vehicles_involved.len(), 1);
        assert_eq!(record.vehicles_involved[0].kind, "two cars");
    }

    #[test]
    fn test_extra_keys_are_kept() {
        let record = normalize_text(r#"{"response": {"scene_summary": "x", "weather": "fog"}, "model_notes": "n/a"}"#).unwrap();
        assert_eq!(record.extra.get("weather").and_then(|v| v.as_str()), Some("fog"));
        assert!(!record.extra.contains_key("model_notes"));
    }

    #[test]
    fn test_blocked_response_yields_sentinel() {
        let record = normalize(&InferenceResponse::blocked("SAFETY")).unwrap();
        assert_eq!(record.collision_type, CollisionType::SafetyBlocked);
        assert_eq!(record.severity_score, 0);
        assert!(record.license_plates_detected.is_empty());
        assert!(record.vehicles_involved.is_empty());
        assert_eq!(record.investigative_narrative, SAFETY_BLOCK_NARRATIVE);
        assert_eq!(record, safety_blocked_record());
    }

    #[test]
    fn test_unblocked_response_is_parsed() {
        let record = normalize(&InferenceResponse::from_text(format!("```json\n{}\n```", RECORD_JSON))).unwrap();
        assert_eq!(record.severity_score, 72);
    }

    #[test]
    fn test_video_timeline_is_kept() {
        let record = normalize_text(
            r#"{"scene_summary": "x", "timeline": [{"timestamp_sec": "0.0", "event": "Approach"}, {"timestamp_sec": 2.5, "event": "Impact occurs"}]}"#,
        )
        .unwrap();
        let timeline = record.timeline.unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1].timestamp_sec, "2.5");
        assert_eq!(timeline[1].event, "Impact occurs");
    }
}
