//! Parsing of the model's per-round sufficiency judgment

use serde_json::Value;

use kbqa_core::{Error, Result};

/// Outcome of one judging round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Context is sufficient; `answer` may be empty
    Final { answer: String },
    /// Context is insufficient; an empty `next_query` means the model has nothing to try
    NeedMore { next_query: String },
}

/// Strip an optional Markdown code fence around the payload
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn field_text(object: &serde_json::Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

/// Parse a bare JSON decision object.
///
/// Anything that is not an object with a `final` or `need_more` status is an
/// error; the answer loop treats that as a request for fallback synthesis.
pub fn parse_decision(text: &str) -> Result<Decision> {
    let payload = strip_fence(text);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| Error::Serialization(format!("Decision is not valid JSON: {}", e)))?;

    let Value::Object(object) = value else {
        return Err(Error::InvalidInput("Decision must be a JSON object".to_string()));
    };

    let status = field_text(&object, "status").to_lowercase();
    match status.as_str() {
        "final" => Ok(Decision::Final {
            answer: field_text(&object, "answer"),
        }),
        "need_more" => Ok(Decision::NeedMore {
            next_query: field_text(&object, "next_query"),
        }),
        other => Err(Error::InvalidInput(format!(
            "Unknown decision status '{}'",
            other
        ))),
    }
}
