//! Anthropic Messages request/response shape, shared by the Bedrock and
//! direct Anthropic providers.

use serde_json::{json, Value};

use crate::provider::{LlmError, Message, Role};

/// `anthropic_version` Bedrock expects for Claude models.
pub const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Build the request body without model routing fields.
///
/// System messages go into the top-level `system` parameter; the rest become
/// text content blocks.
pub fn messages_body(messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let api_messages: Vec<Value> = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            Some(json!({
                "role": role,
                "content": [{ "type": "text", "text": m.content }],
            }))
        })
        .collect();

    let mut body = json!({
        "messages": api_messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });

    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }

    body
}

/// Concatenate every text block of a Messages reply.
pub fn reply_text(resp: &Value) -> Result<String, LlmError> {
    let blocks = resp["content"]
        .as_array()
        .ok_or_else(|| LlmError::ParseError("missing content array".into()))?;

    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect();

    if text.is_empty() {
        return Err(LlmError::ParseError("missing content[0].text".into()));
    }
    Ok(text.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_moves_system_out_of_messages() {
        let body = messages_body(
            &[
                Message::system("You are a chef."),
                Message::user("Suggest a recipe idea using these ingredients: flour."),
            ],
            0.5,
            1000,
        );

        assert_eq!(body["system"], "You are a chef.");
        assert_eq!(body["max_tokens"], 1000);
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"][0]["type"], "text");
        assert_eq!(
            msgs[0]["content"][0]["text"],
            "Suggest a recipe idea using these ingredients: flour."
        );
    }

    #[test]
    fn body_without_system_has_no_system_key() {
        let body = messages_body(&[Message::user("hi")], 1.0, 10);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn reply_text_joins_text_blocks() {
        let resp = json!({
            "id": "msg_01",
            "content": [
                { "type": "text", "text": "Crepes: " },
                { "type": "text", "text": "whisk flour, sugar and eggs." }
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(reply_text(&resp).unwrap(), "Crepes: whisk flour, sugar and eggs.");
    }

    #[test]
    fn reply_text_without_text_is_parse_error() {
        let resp = json!({ "content": [] });
        assert!(matches!(reply_text(&resp), Err(LlmError::ParseError(_))));
        assert!(matches!(reply_text(&json!({})), Err(LlmError::ParseError(_))));
    }
}
