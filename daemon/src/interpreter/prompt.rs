//! Instruction template and command extraction

use serde_json::{Map, Value};

use crate::browser::Command;

use super::InterpretError;

const INSTRUCTIONS: &str = r#"Analyze the following user voice command and determine the browser action.
Respond ONLY with a valid JSON object containing 'action' and optional 'params'.
Do not include any explanations, markdown formatting, or anything outside the JSON object.

Possible actions and their params:
- "open_url": { "url": "string" } (Ensure URL starts with https://)
- "new_tab": {}
- "close_tab": {}
- "scroll": { "direction": "up" | "down" }
- "switch_tab": { "target": "first" | "last" | number (1-8) }"#;

/// Full prompt sent for one transcript
pub fn build_prompt(transcript: &str) -> String {
    // Quotes inside the transcript would close the quoted command early
    let quoted = transcript.replace('"', "'");
    format!("{INSTRUCTIONS}\n\nUser Command: \"{quoted}\"\n\nJSON Response:")
}

/// Parse the model's text reply into a [`Command`]
pub fn parse_command(raw: &str) -> Result<Command, InterpretError> {
    let body = strip_code_fence(raw.trim());

    let value: Value =
        serde_json::from_str(body).map_err(|e| InterpretError::Malformed(e.to_string()))?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(InterpretError::MissingAction)?;

    let params = match value.get("params") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Ok(Command {
        action: action.to_string(),
        params,
    })
}

/// Remove a surrounding Markdown code fence, if present
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") only when the fence has its own line
    let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}
