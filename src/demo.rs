//! Bundled demonstration tools served by the default binary.
//!
//! A tiny translation service: a fixed phrase table with a mock fallback, and
//! an accent-based language detector. Meant as wiring reference, not as a
//! translation product.

use serde_json::{Value, json};

use crate::registry::{ToolDefinition, ToolError};

fn require_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::new(format!("{field} is required")))
}

/// `translate`: fixed-table translation with a `[to] text` mock fallback.
pub fn translate_tool() -> ToolDefinition {
    ToolDefinition::from_fn(
        "translate",
        "Translate text between languages",
        |input| async move {
            let text = require_str(&input, "text")?;
            let from = require_str(&input, "from")?;
            let to = require_str(&input, "to")?;

            let translated = match (text.to_lowercase().as_str(), to) {
                ("hello", "es") => "hola".to_string(),
                ("hello", "fr") => "bonjour".to_string(),
                ("goodbye", "es") => "adiós".to_string(),
                ("goodbye", "fr") => "au revoir".to_string(),
                _ => format!("[{to}] {text}"),
            };

            Ok(json!({
                "original": text,
                "translated": translated,
                "from": from,
                "to": to,
            }))
        },
    )
    .with_input_schema(json!({
        "type": "object",
        "required": ["text", "from", "to"],
        "properties": {
            "text": { "type": "string" },
            "from": { "type": "string" },
            "to": { "type": "string" },
        },
    }))
}

/// `detect_language`: accent-character heuristics over es/fr/en.
pub fn detect_language_tool() -> ToolDefinition {
    ToolDefinition::from_fn(
        "detect_language",
        "Detect language of text",
        |input| async move {
            let text = require_str(&input, "text")?;
            let lower = text.to_lowercase();

            let (language, confidence) = if lower.chars().any(|c| "áéíóúñ".contains(c)) {
                ("es", 0.8)
            } else if lower.chars().any(|c| "àâçéèêëïîôùûü".contains(c)) {
                ("fr", 0.8)
            } else if text.chars().all(|c| c.is_ascii_alphabetic() || c.is_whitespace()) {
                ("en", 0.8)
            } else {
                ("en", 0.5)
            };

            Ok(json!({ "language": language, "confidence": confidence }))
        },
    )
    .with_input_schema(json!({
        "type": "object",
        "required": ["text"],
        "properties": {
            "text": { "type": "string" },
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_translate_known_phrase() {
        let tool = translate_tool();
        let output = tool
            .handler()
            .call(json!({"text": "hello", "from": "en", "to": "es"}))
            .await
            .unwrap();
        assert_eq!(
            output,
            json!({"original": "hello", "translated": "hola", "from": "en", "to": "es"})
        );
    }

    #[tokio::test]
    async fn test_translate_fallback() {
        let tool = translate_tool();
        let output = tool
            .handler()
            .call(json!({"text": "good morning", "from": "en", "to": "de"}))
            .await
            .unwrap();
        assert_eq!(output["translated"], "[de] good morning");
    }

    #[tokio::test]
    async fn test_detect_language() {
        let tool = detect_language_tool();

        let output = tool.handler().call(json!({"text": "mañana"})).await.unwrap();
        assert_eq!(output["language"], "es");

        let output = tool.handler().call(json!({"text": "être"})).await.unwrap();
        assert_eq!(output["language"], "fr");

        let output = tool.handler().call(json!({"text": "hello there"})).await.unwrap();
        assert_eq!(output["language"], "en");
        assert_eq!(output["confidence"], 0.8);
    }
}
