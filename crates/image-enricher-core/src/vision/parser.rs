//! Turns free-form model output into an `AnalysisResult`.
//!
//! Models are asked for bare JSON but often wrap it in prose. The parser looks
//! for the first object in the text and reads it leniently; when there is no
//! usable object the whole reply becomes the description instead.

use serde_json::{Map, Value};

use crate::types::AnalysisResult;

/// Scene label used when the model gives none
pub const UNKNOWN_SCENE: &str = "unknown";

/// How a response was understood
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// A JSON object was found and read
    Structured(AnalysisResult),
    /// No usable JSON; the raw text is kept as the description
    Fallback { result: AnalysisResult, reason: String },
}

impl AnalysisOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback { .. })
    }

    pub fn result(&self) -> &AnalysisResult {
        match self {
            AnalysisOutcome::Structured(result) => result,
            AnalysisOutcome::Fallback { result, .. } => result,
        }
    }

    pub fn into_result(self) -> AnalysisResult {
        match self {
            AnalysisOutcome::Structured(result) => result,
            AnalysisOutcome::Fallback { result, .. } => result,
        }
    }
}

/// Parse a model reply. Never fails.
pub fn parse_response(raw: &str, default_confidence: f64, fallback_confidence: f64) -> AnalysisOutcome {
    match first_object(raw) {
        Ok(map) => AnalysisOutcome::Structured(read_object(&map, default_confidence)),
        Err(reason) => AnalysisOutcome::Fallback {
            result: AnalysisResult {
                description: raw.to_string(),
                objects: Vec::new(),
                people: Vec::new(),
                scene_type: UNKNOWN_SCENE.to_string(),
                activities: Vec::new(),
                confidence: fallback_confidence,
            },
            reason,
        },
    }
}

// Decodes one JSON value starting at the first brace; trailing text is ignored
fn first_object(raw: &str) -> Result<Map<String, Value>, String> {
    let start = raw.find('{').ok_or_else(|| "no JSON object in response".to_string())?;

    let mut values = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(Value::Object(map))) => Ok(map),
        Some(Ok(_)) => Err("response JSON is not an object".to_string()),
        Some(Err(e)) => Err(format!("invalid JSON: {}", e)),
        None => Err("no JSON object in response".to_string()),
    }
}

fn read_object(map: &Map<String, Value>, default_confidence: f64) -> AnalysisResult {
    AnalysisResult {
        description: string_field(map, "description").unwrap_or_default(),
        objects: string_list(map, "objects"),
        people: string_list(map, "people"),
        scene_type: string_field(map, "scene_type").unwrap_or_else(|| UNKNOWN_SCENE.to_string()),
        activities: string_list(map, "activities"),
        confidence: confidence(map.get("confidence")).unwrap_or(default_confidence),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

// Non-string entries are skipped, a non-list reads as empty
fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn confidence(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if number.is_finite() {
        Some(number.clamp(0.0, 1.0))
    } else {
        None
    }
}
