// Lorekeep: Host chat parsing
//
// Accepts the two shapes a host chat export comes in:
//   • JSONL: one object per line; the first line may be chat metadata
//     (no `mes` field) and is skipped.
//   • JSON array of message objects.
//
// Host field names: `name`, `is_user`, `is_system`, `mes`, `send_date`
// (string or epoch number). `text` is accepted as an alias for `mes`.

use serde_json::Value;

use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::types::ChatMessage;

/// Parse a chat export into messages indexed from 0.
pub fn parse_chat(input: &str) -> LoreResult<Vec<ChatMessage>> {
    let trimmed = input.trim_start();
    let values: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<Value>>(trimmed)?
    } else {
        let mut out = Vec::new();
        for (line_no, line) in input.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(v) => out.push(v),
                Err(e) => {
                    return Err(LoreError::Other(format!(
                        "chat line {}: invalid JSON: {e}",
                        line_no + 1
                    )))
                }
            }
        }
        out
    };

    let mut messages = Vec::with_capacity(values.len());
    for value in values {
        if let Some(msg) = message_from_value(value, messages.len())? {
            messages.push(msg);
        }
    }
    Ok(messages)
}

/// Map one host object to a message; `None` for metadata rows (no text).
fn message_from_value(value: Value, index: usize) -> LoreResult<Option<ChatMessage>> {
    let has_text = value
        .as_object()
        .and_then(|obj| obj.get("mes").or_else(|| obj.get("text")))
        .is_some_and(Value::is_string);
    if !has_text {
        return Ok(None);
    }
    let mut message: ChatMessage = serde_json::from_value(value)
        .map_err(|e| LoreError::Other(format!("chat message {index}: {e}")))?;
    message.index = index;
    Ok(Some(message))
}

/// Render messages as `Name: text` lines, skipping system and empty messages.
pub fn transcript(messages: &[&ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| !m.is_system && !m.text.trim().is_empty())
        .map(|m| {
            let name = if m.name.is_empty() {
                if m.is_user { "User" } else { "Narrator" }
            } else {
                m.name.as_str()
            };
            format!("{}: {}", name, m.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jsonl_and_skips_metadata() {
        let input = r#"{"user_name":"You","character_name":"Elara","create_date":"2024-01-01"}
{"name":"You","is_user":true,"is_system":false,"send_date":"2024-01-01 10:00","mes":"Hello there."}
{"name":"Elara","is_user":false,"send_date":1704103200000,"mes":"Welcome, traveller."}
"#;
        let msgs = parse_chat(input).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].index, 0);
        assert!(msgs[0].is_user);
        assert_eq!(msgs[1].name, "Elara");
        assert_eq!(msgs[1].send_date.as_deref(), Some("1704103200000"));
    }

    #[test]
    fn parses_json_array_with_text_alias() {
        let input = r#"[{"name":"Kael","text":"Onward."},{"name":"Mira","mes":"Wait!"}]"#;
        let msgs = parse_chat(input).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text, "Onward.");
        assert_eq!(msgs[1].index, 1);
    }

    #[test]
    fn host_rows_with_extra_fields_deserialize() {
        let input = r#"{"name":"Elara","is_user":false,"is_system":true,"send_date":"2024-01-01 10:00","mes":"Dawn breaks.","swipes":["Dawn breaks."],"extra":{"api":"openai"}}
{"chat_metadata":{"note":"x"},"mes":42}
{"name":"You","is_user":true,"mes":"Morning."}
"#;
        let msgs = parse_chat(input).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].is_system);
        assert_eq!(msgs[0].text, "Dawn breaks.");
        assert_eq!(msgs[1].index, 1);
        assert_eq!(msgs[1].send_date, None);
    }

    #[test]
    fn invalid_line_reports_line_number() {
        let err = parse_chat("{\"mes\":\"ok\"}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn transcript_skips_system_messages() {
        let a = ChatMessage::user(0, "You", "Hi");
        let b = ChatMessage::system(1, "[scene change]");
        let c = ChatMessage::new(2, "", "The wind howled.");
        let t = transcript(&[&a, &b, &c]);
        assert_eq!(t, "You: Hi\nNarrator: The wind howled.");
    }
}
