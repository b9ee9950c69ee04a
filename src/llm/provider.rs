//! Model and model provider traits
//!
//! The runner only talks to models through these traits, so any backend
//! (hosted API, local model, scripted test double) can drive a run.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use super::types::{ModelRequest, ResponseEvent};
use crate::items::{ContentPart, MessageContent, ModelResponse, OutputItem};

/// Stream of raw events for one model call
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseEvent>> + Send>>;

/// A language model that can answer a [`ModelRequest`]
#[async_trait]
pub trait Model: Send + Sync {
    /// Produce a complete response.
    async fn get_response(&self, request: ModelRequest) -> Result<ModelResponse>;

    /// Stream a response as raw events.
    ///
    /// The last event must be `ResponseEvent::Completed` carrying the full
    /// response. The default implementation calls `get_response` and replays
    /// it as events.
    async fn stream_response(&self, request: ModelRequest) -> Result<ResponseStream> {
        let response = self.get_response(request).await?;
        Ok(replay_response(response))
    }
}

/// Turn a finished response into the event sequence a streaming model emits
pub fn replay_response(response: ModelResponse) -> ResponseStream {
    Box::pin(async_stream::stream! {
        let response_id = response.response_id.clone().unwrap_or_default();
        yield Ok(ResponseEvent::Created { response_id });

        for (output_index, item) in response.output.iter().enumerate() {
            if let OutputItem::Message(message) = item {
                if let MessageContent::Parts(parts) = &message.content {
                    for part in parts {
                        if let ContentPart::OutputText { text } = part {
                            yield Ok(ResponseEvent::OutputTextDelta {
                                output_index,
                                delta: text.clone(),
                            });
                        }
                    }
                }
            }
            yield Ok(ResponseEvent::OutputItemDone {
                output_index,
                item: item.clone(),
            });
        }

        yield Ok(ResponseEvent::Completed { response });
    })
}

/// Resolves model names to model instances
pub trait ModelProvider: Send + Sync {
    /// Look up a model; `None` asks for the provider's default
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>>;
}

/// Provider backed by a fixed table of models
///
/// Unknown names resolve to the default model unless `strict` is set.
pub struct StaticModelProvider {
    default: Arc<dyn Model>,
    models: HashMap<String, Arc<dyn Model>>,
    strict: bool,
}

impl StaticModelProvider {
    pub fn new(default: Arc<dyn Model>) -> Self {
        Self {
            default,
            models: HashMap::new(),
            strict: false,
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    /// Reject names that are not registered instead of falling back
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl ModelProvider for StaticModelProvider {
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>> {
        match name {
            None => Ok(self.default.clone()),
            Some(name) => match self.models.get(name) {
                Some(model) => Ok(model.clone()),
                None if self.strict => anyhow::bail!("model {:?} is not registered", name),
                None => {
                    tracing::debug!("[ModelProvider] Unknown model {}, using default", name);
                    Ok(self.default.clone())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Message;
    use futures::StreamExt;

    struct FixedModel;

    #[async_trait]
    impl Model for FixedModel {
        async fn get_response(&self, _request: ModelRequest) -> Result<ModelResponse> {
            Ok(ModelResponse::new(
                "resp_fixed",
                vec![OutputItem::Message(Message::assistant("m1", "hello"))],
            ))
        }
    }

    #[tokio::test]
    async fn test_default_stream_replays_response() {
        let model = FixedModel;
        let mut stream = model.stream_response(ModelRequest::default()).await.unwrap();

        let mut types = Vec::new();
        while let Some(event) = stream.next().await {
            types.push(event.unwrap().event_type());
        }
        assert_eq!(
            types,
            vec![
                "response.created",
                "response.output_text.delta",
                "response.output_item.done",
                "response.completed"
            ]
        );
    }

    #[test]
    fn test_static_provider_lookup() {
        let default: Arc<dyn Model> = Arc::new(FixedModel);
        let named: Arc<dyn Model> = Arc::new(FixedModel);
        let provider = StaticModelProvider::new(default.clone()).with_model("gpt-test", named.clone());

        assert!(Arc::ptr_eq(&provider.get_model(Some("gpt-test")).unwrap(), &named));
        assert!(Arc::ptr_eq(&provider.get_model(None).unwrap(), &default));
        assert!(Arc::ptr_eq(&provider.get_model(Some("other")).unwrap(), &default));

        let strict = StaticModelProvider::new(default).strict();
        assert!(strict.get_model(Some("other")).is_err());
    }
}
