//! Offline models
//!
//! `ScriptedModel` replays a queue of canned responses and records every
//! request it receives. `EchoModel` answers with the last user message and is
//! what the manifest runner uses when no hosted model is wired in.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::provider::Model;
use super::types::ModelRequest;
use crate::items::{FunctionToolCall, Message, ModelResponse, OutputItem, Usage};

enum Step {
    Respond(ModelResponse),
    Fail(String),
}

/// Model that answers from a pre-recorded script
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
    queued: usize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            queued: 0,
        }
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn next_id(&mut self) -> String {
        self.queued += 1;
        format!("resp_{}", self.queued)
    }

    fn push(mut self, step: Step) -> Self {
        self.steps
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// Queue a response holding arbitrary output items
    pub fn then_output(mut self, output: Vec<OutputItem>) -> Self {
        let id = self.next_id();
        let response = ModelResponse {
            output,
            usage: Usage {
                requests: 1,
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
            response_id: Some(id),
        };
        self.push(Step::Respond(response))
    }

    /// Queue a plain assistant message
    pub fn then_message(self, text: impl Into<String>) -> Self {
        let msg_id = format!("msg_{}", self.queued + 1);
        let output = vec![OutputItem::Message(Message::assistant(msg_id, text))];
        self.then_output(output)
    }

    /// Queue a single function call
    pub fn then_tool_call(self, call_id: &str, name: &str, arguments: serde_json::Value) -> Self {
        let call = FunctionToolCall::new(call_id, name, arguments.to_string());
        self.then_output(vec![OutputItem::FunctionCall(call)])
    }

    /// Queue a failure
    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.push(Step::Fail(message.into()))
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn get_response(&self, request: ModelRequest) -> Result<ModelResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match step {
            Some(Step::Respond(response)) => {
                tracing::debug!(
                    "[ScriptedModel] Responding with {:?} ({} items)",
                    response.response_id,
                    response.output.len()
                );
                Ok(response)
            }
            Some(Step::Fail(message)) => anyhow::bail!(message),
            None => anyhow::bail!("scripted model has no responses left"),
        }
    }
}

/// Model that repeats the latest user message back
///
/// When the request carries an output schema the echo is wrapped as
/// `{"response": ...}` so structured agents still finish.
#[derive(Debug, Default, Clone)]
pub struct EchoModel;

impl EchoModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Model for EchoModel {
    async fn get_response(&self, request: ModelRequest) -> Result<ModelResponse> {
        let text = request.last_user_text().unwrap_or_default();
        let body = if request.output_schema.is_some() {
            json!({ "response": text }).to_string()
        } else {
            text
        };

        let id = uuid::Uuid::new_v4().simple().to_string();
        let words = body.split_whitespace().count() as u64;
        Ok(ModelResponse {
            output: vec![OutputItem::Message(Message::assistant(format!("msg_{}", id), body))],
            usage: Usage {
                requests: 1,
                input_tokens: words,
                output_tokens: words,
                total_tokens: words * 2,
            },
            response_id: Some(format!("resp_{}", id)),
        })
    }
}
