/// Tool-call intent extraction from free-form completion text.
///
/// The model is asked to answer with `{"tool": ..., "arguments": {...}}` but
/// often wraps it in prose or code fences. Extraction tries, in order: the
/// whole text as JSON, the first flat object matching the tool-call shape, and
/// the span from the first `{` to the last `}`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::registry::Arguments;

static TOOL_CALL_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"tool"\s*:\s*"[^"]+"\s*,\s*"arguments"\s*:\s*\{[^{}]*\}[^{}]*\}"#).ok()
});

#[derive(Debug, Clone, PartialEq)]
pub struct ToolIntent {
    pub tool: String,
    pub arguments: Arguments,
}

/// Interpret `candidate` as a tool call. A `tool` string is required;
/// `arguments` may be absent or null but otherwise must be an object.
fn parse_candidate(candidate: &str) -> Option<ToolIntent> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(candidate).ok()? else {
        return None;
    };
    let Some(Value::String(tool)) = object.remove("tool") else {
        return None;
    };
    let arguments = match object.remove("arguments") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(arguments)) => arguments,
        Some(_) => return None,
    };
    Some(ToolIntent { tool, arguments })
}

pub fn extract_intent(text: &str) -> Option<ToolIntent> {
    if let Some(intent) = parse_candidate(text) {
        return Some(intent);
    }

    if let Some(intent) = TOOL_CALL_OBJECT
        .as_ref()
        .and_then(|re| re.find(text))
        .and_then(|found| parse_candidate(found.as_str()))
    {
        return Some(intent);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_candidate(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn bare_json_reply_is_used_directly() {
        let intent = extract_intent(r#"{"tool": "get_all_users", "arguments": {}}"#).unwrap();
        assert_eq!(intent.tool, "get_all_users");
        assert!(intent.arguments.is_empty());
    }

    #[test]
    fn tool_call_embedded_in_prose_is_found() {
        let text = r#"Sure! {"note": 1} Here you go: {"tool": "get_user_by_id", "arguments": {"id": 1}} Anything else?"#;
        let intent = extract_intent(text).unwrap();
        assert_eq!(intent.tool, "get_user_by_id");
        assert_eq!(intent.arguments, args(json!({ "id": 1 })));
    }

    #[test]
    fn outer_braces_cover_nested_arguments() {
        let text = "```json\n{\"tool\": \"update_user\", \"arguments\": {\"id\": 2, \"meta\": {\"x\": 1}}}\n```";
        let intent = extract_intent(text).unwrap();
        assert_eq!(intent.tool, "update_user");
        assert_eq!(intent.arguments["id"], 2);
    }

    #[test]
    fn missing_arguments_default_to_empty() {
        let intent = extract_intent(r#"{"tool": "get_all_users"}"#).unwrap();
        assert!(intent.arguments.is_empty());
    }

    #[test]
    fn plain_answers_have_no_intent() {
        assert_eq!(extract_intent("Hello! How can I help you today?"), None);
        assert_eq!(extract_intent(r#"{"answer": 42}"#), None);
        assert_eq!(extract_intent("} backwards {"), None);
        assert_eq!(extract_intent(r#"{"tool": "x", "arguments": [1]}"#), None);
    }
}
