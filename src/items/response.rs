//! Raw model responses and token usage

use serde::{Deserialize, Serialize};

use super::input::InputItem;
use super::output::OutputItem;

/// Token accounting for one or more model calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.requests += other.requests;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Output of one model call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

impl ModelResponse {
    pub fn new(response_id: impl Into<String>, output: Vec<OutputItem>) -> Self {
        Self {
            output,
            usage: Usage::default(),
            response_id: Some(response_id.into()),
        }
    }

    /// The response's output as input items for a follow-up call
    pub fn to_input_items(&self) -> Vec<InputItem> {
        self.output.iter().cloned().map(InputItem::from).collect()
    }
}

/// Id of the last response, or an empty string when there is none
pub fn last_response_id(responses: &[ModelResponse]) -> String {
    responses
        .last()
        .and_then(|r| r.response_id.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Message;

    #[test]
    fn test_usage_add() {
        let mut total = Usage::default();
        total.add(&Usage {
            requests: 1,
            input_tokens: 3,
            output_tokens: 4,
            total_tokens: 7,
        });
        total.add(&Usage {
            requests: 1,
            input_tokens: 1,
            output_tokens: 1,
            total_tokens: 2,
        });
        assert_eq!(total.requests, 2);
        assert_eq!(total.total_tokens, 9);
    }

    #[test]
    fn test_last_response_id() {
        assert_eq!(last_response_id(&[]), "");

        let responses = vec![
            ModelResponse::new("resp_1", vec![]),
            ModelResponse::new("resp_2", vec![]),
        ];
        assert_eq!(last_response_id(&responses), "resp_2");
    }

    #[test]
    fn test_to_input_items() {
        let response = ModelResponse::new(
            "resp_1",
            vec![OutputItem::Message(Message::assistant("m1", "hi"))],
        );
        let items = response.to_input_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_message().unwrap().text(), "hi");
    }
}
