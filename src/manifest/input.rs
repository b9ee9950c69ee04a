//! Conversion of manifest inputs into model input items
//!
//! `text`, `message` and `image` inputs become messages. JSON, audio and video
//! inputs pass validation but are rejected here until a model accepts them.

use serde_json::{json, Map, Value};

use super::types::WorkflowInput;
use crate::core::{WorkflowError, WorkflowResult};
use crate::items::{ContentPart, ImageDetail, InputItem, Message, MessageContent, Role};

type Convert<T> = Result<T, String>;

/// Convert every input; errors name the failing input (`inputs[i]: ...`)
pub fn build_input_items(inputs: &[WorkflowInput]) -> WorkflowResult<Vec<InputItem>> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            convert_input(input).map_err(|e| WorkflowError::Input(format!("inputs[{}]: {}", i, e)))
        })
        .collect()
}

fn convert_input(input: &WorkflowInput) -> Convert<InputItem> {
    let uri = input.uri.trim();
    let message = match input.input_type.trim().to_ascii_lowercase().as_str() {
        "message" => build_message(&input.role, input.content.as_ref(), uri)?,
        "text" => {
            let role = if input.role.trim().is_empty() { "user" } else { input.role.as_str() };
            let content = match (&input.content, uri.is_empty()) {
                (Some(content), _) => content.clone(),
                (None, false) => Value::String(uri.to_string()),
                (None, true) => return Err("text input requires content or uri".into()),
            };
            build_message(role, Some(&content), "")?
        }
        "image" => {
            if uri.is_empty() && input.content.is_none() {
                return Err("image input requires uri or content".into());
            }
            let content = match &input.content {
                Some(Value::Array(parts)) => Value::Array(parts.clone()),
                Some(Value::Object(part)) => Value::Array(vec![Value::Object(part.clone())]),
                _ => json!([{"type": "input_image", "image_url": uri}]),
            };
            let role = if input.role.trim().is_empty() { "user" } else { input.role.trim() };
            build_message(role, Some(&content), "")?
        }
        _ => return Err(format!("type {:?} not supported yet", input.input_type)),
    };
    Ok(InputItem::Message(message))
}

fn build_message(role: &str, content: Option<&Value>, uri: &str) -> Convert<Message> {
    let role = normalize_role(role)?;

    if content.is_none() && !uri.is_empty() {
        let parts = build_parts(&[json!({"type": "input_image", "image_url": uri})])?;
        return Ok(Message::new(role, MessageContent::Parts(parts)));
    }

    let content = match content {
        None | Some(Value::Null) => return Err("message input requires content".into()),
        Some(Value::String(text)) => MessageContent::Text(text.clone()),
        Some(Value::Array(parts)) => MessageContent::Parts(build_parts(parts)?),
        Some(Value::Object(object)) => object_content(object)?,
        Some(other) => return Err(format!("message content type {} not supported", json_kind(other))),
    };
    Ok(Message::new(role, content))
}

/// `{parts: [...]}`, `{text: "..."}`, or a literal content union
fn object_content(object: &Map<String, Value>) -> Convert<MessageContent> {
    if let Some(parts) = object.get("parts") {
        let parts = parts
            .as_array()
            .ok_or_else(|| "message content parts must be an array".to_string())?;
        return Ok(MessageContent::Parts(build_parts(parts)?));
    }
    if let Some(text) = string_field(object, "text").filter(|t| !t.is_empty()) {
        return Ok(MessageContent::Text(text.to_string()));
    }
    match serde_json::from_value::<MessageContent>(Value::Object(object.clone())) {
        Ok(content) => Ok(content),
        Err(e) => Err(format!("decode message content: {}", e)),
    }
}

fn build_parts(parts: &[Value]) -> Convert<Vec<ContentPart>> {
    if parts.is_empty() {
        return Err("message content list cannot be empty".into());
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| build_part(part).map_err(|e| format!("content[{}]: {}", i, e)))
        .collect()
}

fn build_part(value: &Value) -> Convert<ContentPart> {
    let object = match value {
        Value::String(text) => return Ok(ContentPart::input_text(text.clone())),
        Value::Object(object) => object,
        other => return Err(format!("unsupported content item type {}", json_kind(other))),
    };

    let kind = string_field(object, "type")
        .filter(|k| !k.is_empty())
        .unwrap_or("input_text")
        .to_ascii_lowercase();
    match kind.as_str() {
        "input_text" | "text" => match string_field(object, "text").filter(|t| !t.is_empty()) {
            Some(text) => Ok(ContentPart::input_text(text)),
            None => Err("text content requires text field".into()),
        },
        "input_image" | "image" => {
            let detail = match string_field(object, "detail").map(str::to_ascii_lowercase).as_deref() {
                Some("low") => ImageDetail::Low,
                Some("high") => ImageDetail::High,
                _ => ImageDetail::Auto,
            };
            let image_url = non_empty(object, "image_url");
            let file_id = non_empty(object, "file_id");
            if image_url.is_none() && file_id.is_none() {
                return Err("image content requires image_url or file_id".into());
            }
            Ok(ContentPart::InputImage {
                image_url,
                file_id,
                detail,
            })
        }
        "input_file" | "file" => {
            let file_url = non_empty(object, "file_url");
            let file_data = non_empty(object, "file_data");
            let file_id = non_empty(object, "file_id");
            if file_url.is_none() && file_data.is_none() && file_id.is_none() {
                return Err("file content requires file_url, file_data, or file_id".into());
            }
            Ok(ContentPart::InputFile {
                file_url,
                file_data,
                file_id,
            })
        }
        other => serde_json::from_value::<ContentPart>(value.clone())
            .map_err(|_| format!("custom content {:?} missing recognized payload", other)),
    }
}

fn normalize_role(role: &str) -> Convert<Role> {
    match role.trim().to_ascii_lowercase().as_str() {
        "" | "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "system" => Ok(Role::System),
        "developer" => Ok(Role::Developer),
        _ => Err(format!("role {:?} not supported", role)),
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

fn non_empty(object: &Map<String, Value>, key: &str) -> Option<String> {
    string_field(object, key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
