use serde_json::{Map, Value};

use crate::audit::record::AuditRecord;
use crate::error::SchemaError;

pub const REQUIRED_FIELDS: [&str; 8] = [
    "barrier_detected",
    "renovation_suggestion",
    "estimated_cost_usd",
    "compliance_note",
    "build_mask",
    "build_prompt",
    "mask_prompt",
    "image_gen_prompt",
];

/// Text as the backend wrote it. Lists are joined with "; " and other JSON values keep their
/// JSON spelling, so an unexpected shape never discards the audit.
fn text_field(fields: &Map<String, Value>, name: &str) -> String {
    match fields.get(name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
    }
}

/// Checks the vision reply has every required key and normalizes it into an [`AuditRecord`].
///
/// Missing keys are all reported together; a non-numeric cost or a blank barrier is rejected.
/// Nothing else fails: `clear_mask` and `clear_prompt` default to empty, a negative cost is clamped to zero,
/// and text fields are passed through. The returned record has no score yet.
pub fn validate(fields: &Map<String, Value>) -> Result<AuditRecord, SchemaError> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|name| !fields.contains_key(**name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::MissingFields(missing));
    }

    let estimated_cost_usd = fields
        .get("estimated_cost_usd")
        .and_then(Value::as_f64)
        .ok_or_else(|| SchemaError::InvalidField {
            field: "estimated_cost_usd",
            reason: "must be a number".to_string(),
        })?
        .max(0.0);

    let barrier_detected = text_field(fields, "barrier_detected");
    if barrier_detected.trim().is_empty() {
        return Err(SchemaError::InvalidField {
            field: "barrier_detected",
            reason: "must not be empty".to_string(),
        });
    }

    let cost_estimate = match fields.get("cost_estimate") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    };

    Ok(AuditRecord {
        barrier_detected,
        renovation_suggestion: text_field(fields, "renovation_suggestion"),
        estimated_cost_usd,
        compliance_note: text_field(fields, "compliance_note"),
        clear_mask: text_field(fields, "clear_mask"),
        clear_prompt: text_field(fields, "clear_prompt"),
        build_mask: text_field(fields, "build_mask"),
        build_prompt: text_field(fields, "build_prompt"),
        mask_prompt: text_field(fields, "mask_prompt"),
        image_gen_prompt: text_field(fields, "image_gen_prompt"),
        cost_estimate,
        accessibility_score: 0,
    })
}
