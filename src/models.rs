//! Shared data models used across modules

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};

/// Canonical output of a scene reconstruction.
///
/// Built from any JSON object: missing, `null` or wrongly typed fields are
/// coerced or fall back to defaults, and keys outside the schema are kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct ForensicRecord {
    pub scene_summary: String,
    pub collision_type: CollisionType,
    pub severity_score: u8,
    pub pedestrians_detected: bool,
    pub license_plates_detected: Vec<String>,
    pub vehicles_involved: Vec<Vehicle>,
    pub investigative_narrative: String,
    /// Video analyses only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<TimelineEvent>>,
    /// Attached by the pipeline after normalization, never by the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_meta: Option<VideoMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for ForensicRecord {
    fn from(mut object: Map<String, Value>) -> Self {
        let mut take = |key: &str| object.shift_remove(key).unwrap_or(Value::Null);

        let scene_summary = text(take("scene_summary"));
        let collision_type = CollisionType::from(text(take("collision_type")));
        let severity_score = percentage(take("severity_score"));
        let pedestrians_detected = flag(take("pedestrians_detected"));
        let license_plates_detected = plates(take("license_plates_detected"));
        let vehicles_involved = match take("vehicles_involved") {
            Value::Array(items) => items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(Vehicle::from)
                .collect(),
            vehicle @ Value::Object(_) => vec![Vehicle::from(vehicle)],
            _ => Vec::new(),
        };
        let investigative_narrative = text(take("investigative_narrative"));
        let timeline = match take("timeline") {
            Value::Array(items) => Some(items.into_iter().map(TimelineEvent::from).collect()),
            _ => None,
        };
        let video_meta = serde_json::from_value(take("video_meta")).ok();

        Self {
            scene_summary,
            collision_type,
            severity_score,
            pedestrians_detected,
            license_plates_detected,
            vehicles_involved,
            investigative_narrative,
            timeline,
            video_meta,
            extra: object,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Vehicle {
    #[serde(rename = "type")]
    pub kind: String,
    pub fault_percentage: u8,
    pub reasoning: String,
}

impl From<Value> for Vehicle {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut object) => Self {
                kind: text(object.shift_remove("type").unwrap_or(Value::Null)),
                fault_percentage: percentage(object.shift_remove("fault_percentage").unwrap_or(Value::Null)),
                reasoning: text(object.shift_remove("reasoning").unwrap_or(Value::Null)),
            },
            // A bare label such as "sedan"
            other => Self {
                kind: text(other),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct TimelineEvent {
    /// Approximate second as the model phrased it, e.g. "1.5"
    pub timestamp_sec: String,
    pub event: String,
}

impl From<Value> for TimelineEvent {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut object) => Self {
                timestamp_sec: seconds(object.shift_remove("timestamp_sec").unwrap_or(Value::Null)),
                event: text(object.shift_remove("event").unwrap_or(Value::Null)),
            },
            other => Self {
                timestamp_sec: String::new(),
                event: text(other),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub fps: f64,
    pub frames_analyzed: usize,
}

/// Collision classification. Labels outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CollisionType {
    HeadOn,
    RearEnd,
    SideImpact,
    Rollover,
    #[default]
    NotApplicable,
    SafetyBlocked,
    Other(String),
}

impl CollisionType {
    pub fn as_str(&self) -> &str {
        match self {
            CollisionType::HeadOn => "Head-on",
            CollisionType::RearEnd => "Rear-end",
            CollisionType::SideImpact => "Side-impact",
            CollisionType::Rollover => "Rollover",
            CollisionType::NotApplicable => "N/A",
            CollisionType::SafetyBlocked => "Safety Blocked",
            CollisionType::Other(label) => label,
        }
    }
}

impl From<String> for CollisionType {
    fn from(label: String) -> Self {
        let trimmed = label.trim();
        let known = [
            CollisionType::HeadOn,
            CollisionType::RearEnd,
            CollisionType::SideImpact,
            CollisionType::Rollover,
            CollisionType::NotApplicable,
            CollisionType::SafetyBlocked,
        ];
        if trimmed.is_empty() {
            return CollisionType::NotApplicable;
        }
        known
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .unwrap_or_else(|| CollisionType::Other(trimmed.to_string()))
    }
}

impl From<CollisionType> for String {
    fn from(kind: CollisionType) -> Self {
        match kind {
            CollisionType::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CollisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of evidence submitted for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by file extension (case-insensitive). `None` when unsupported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Clamp a model-supplied score into 0..=100, rounding fractions.
pub fn clamp_percentage(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Round to one decimal place, as timestamps and fps are reported.
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Free text. Scalars are stringified, lists joined, objects kept as JSON.
fn text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(items) => items
            .into_iter()
            .map(text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// Scores as numbers or numeric strings ("85", "85%"). Anything else is 0.
fn percentage(value: Value) -> u8 {
    let score = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    score.map(clamp_percentage).unwrap_or(0)
}

fn flag(value: Value) -> bool {
    match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        ),
        _ => false,
    }
}

/// Placeholders models write instead of an empty list.
fn is_no_plate(s: &str) -> bool {
    let s = s.trim().to_ascii_lowercase();
    s.is_empty() || s == "n/a" || s == "no" || s == "unknown" || s.starts_with("none") || s.starts_with("no ")
}

fn plates(value: Value) -> Vec<String> {
    let candidates = match value {
        Value::Array(items) => items.into_iter().map(text).collect(),
        Value::String(s) => vec![s],
        _ => Vec::new(),
    };
    candidates
        .into_iter()
        .filter(|plate| !is_no_plate(plate))
        .map(|plate| plate.trim().to_string())
        .collect()
}

/// Timeline seconds as text. Whole numbers keep one decimal ("2.0").
fn seconds(value: Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(secs) if secs.fract() == 0.0 => format!("{:.1}", secs),
            _ => n.to_string(),
        },
        other => text(other),
    }
}
