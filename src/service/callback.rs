//! Callback publishers
//!
//! Every run emits `run.started`, one `run.event` per stream event and then
//! exactly one of `run.completed` / `run.failed`. Publishers deliver those
//! events somewhere: an HTTP endpoint or stdout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{WorkflowError, WorkflowResult};
use crate::manifest::{CallbackDeclaration, CallbackRetryPolicy};

pub const RUN_STARTED: &str = "run.started";
pub const RUN_EVENT: &str = "run.event";
pub const RUN_COMPLETED: &str = "run.completed";
pub const RUN_FAILED: &str = "run.failed";

/// One event delivered to callback targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl CallbackEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Delivers callback events
#[async_trait]
pub trait CallbackPublisher: Send + Sync {
    async fn publish(&self, event: &CallbackEvent) -> WorkflowResult<()>;
}

/// Builds a publisher from a callback declaration
pub type CallbackFactory = Arc<dyn Fn(&CallbackDeclaration) -> WorkflowResult<Arc<dyn CallbackPublisher>> + Send + Sync>;

/// Default mapping from declaration mode to publisher
pub fn publisher_for(decl: &CallbackDeclaration) -> WorkflowResult<Arc<dyn CallbackPublisher>> {
    match decl.mode().as_str() {
        "" | "http" => Ok(Arc::new(HttpCallbackPublisher::from_declaration(decl))),
        "stdout" | "stdout_verbose" => Ok(Arc::new(StdoutCallbackPublisher)),
        _ => Err(WorkflowError::Callback(format!("unsupported callback mode {:?}", decl.mode))),
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// POSTs each event as JSON, retrying failed deliveries
pub struct HttpCallbackPublisher {
    client: Client,
    target: String,
    headers: HashMap<String, String>,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpCallbackPublisher {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            target: target.into(),
            headers: HashMap::new(),
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_declaration(decl: &CallbackDeclaration) -> Self {
        let mut publisher = Self::new(decl.target.trim()).with_headers(decl.headers.clone());
        if let Some(retry) = &decl.retry {
            publisher = publisher.with_retry(retry);
        }
        publisher
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Attempts are at least one; a negative or invalid backoff means none
    pub fn with_retry(mut self, retry: &CallbackRetryPolicy) -> Self {
        self.max_attempts = retry.max_attempts.max(1);
        self.backoff = Duration::try_from_secs_f64(retry.backoff).unwrap_or(Duration::ZERO);
        self
    }

    async fn send(&self, event: &CallbackEvent) -> Result<(), String> {
        let mut request = self.client.post(&self.target).json(event);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!("status {}: {}", status, body.trim()))
    }
}

#[async_trait]
impl CallbackPublisher for HttpCallbackPublisher {
    async fn publish(&self, event: &CallbackEvent) -> WorkflowResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.send(event).await {
                Ok(()) => {
                    tracing::debug!(target_url = %self.target, event = %event.event_type, "[HttpCallback] Delivered");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        target_url = %self.target,
                        event = %event.event_type,
                        attempt,
                        error = %e,
                        "[HttpCallback] Delivery failed"
                    );
                    last_error = e;
                }
            }
            if attempt < self.max_attempts && !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff).await;
            }
        }
        Err(WorkflowError::Callback(format!(
            "post {} to {} failed after {} attempt(s): {}",
            event.event_type, self.target, self.max_attempts, last_error
        )))
    }
}

// ============================================================================
// Stdout and fan-out
// ============================================================================

/// Prints each event as one JSON line
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutCallbackPublisher;

#[async_trait]
impl CallbackPublisher for StdoutCallbackPublisher {
    async fn publish(&self, event: &CallbackEvent) -> WorkflowResult<()> {
        println!("{}", serde_json::to_string(event)?);
        Ok(())
    }
}

/// Publishes to every inner publisher and reports the first failure
#[derive(Clone, Default)]
pub struct MultiCallbackPublisher {
    publishers: Vec<Arc<dyn CallbackPublisher>>,
}

impl MultiCallbackPublisher {
    pub fn new(publishers: Vec<Arc<dyn CallbackPublisher>>) -> Self {
        Self { publishers }
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl CallbackPublisher for MultiCallbackPublisher {
    async fn publish(&self, event: &CallbackEvent) -> WorkflowResult<()> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Recording publisher that can be told to fail
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl CallbackPublisher for Recorder {
        async fn publish(&self, event: &CallbackEvent) -> WorkflowResult<()> {
            self.seen.lock().unwrap().push(event.event_type.clone());
            if self.fail {
                return Err(WorkflowError::Callback("boom".into()));
            }
            Ok(())
        }
    }

    /// Minimal HTTP server answering each connection with the next status
    async fn serve(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (hits_srv, requests_srv) = (hits.clone(), requests.clone());
        tokio::spawn(async move {
            for status in statuses {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_ascii_lowercase();
                                lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                hits_srv.fetch_add(1, Ordering::SeqCst);
                requests_srv.lock().unwrap().push(String::from_utf8_lossy(&buf).to_string());
                let response = format!("HTTP/1.1 {} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}/hook", addr), hits, requests)
    }

    #[test]
    fn test_event_wire_format() {
        let event = CallbackEvent::new(RUN_STARTED, json!({"run_id": "r1"}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("run.started"));
        assert_eq!(value["payload"]["run_id"], json!("r1"));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_publisher_for_modes() {
        assert!(publisher_for(&CallbackDeclaration::url("http://localhost/cb")).is_ok());
        assert!(publisher_for(&CallbackDeclaration::stdout()).is_ok());
        let decl = CallbackDeclaration {
            mode: "kafka".into(),
            ..Default::default()
        };
        let err = publisher_for(&decl).err().unwrap();
        assert_eq!(err.to_string(), "callback error: unsupported callback mode \"kafka\"");
    }

    #[tokio::test]
    async fn test_multi_publisher_reaches_all_and_returns_first_error() {
        let failing = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let ok = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let multi = MultiCallbackPublisher::new(vec![failing.clone(), ok.clone()]);
        let err = multi.publish(&CallbackEvent::new(RUN_EVENT, json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), "callback error: boom");
        assert_eq!(ok.seen.lock().unwrap().as_slice(), ["run.event"]);
    }

    #[tokio::test]
    async fn test_http_publisher_sends_headers() {
        let (url, hits, requests) = serve(vec![200]).await;
        let mut headers = HashMap::new();
        headers.insert("X-Token".to_string(), "abc".to_string());
        let publisher = HttpCallbackPublisher::new(url).with_headers(headers);
        publisher
            .publish(&CallbackEvent::new(RUN_COMPLETED, json!({"final_output": "hi"})))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let request = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(request.starts_with("post /hook"));
        assert!(request.contains("x-token: abc"));
        assert!(request.contains("run.completed"));
    }

    #[tokio::test]
    async fn test_http_publisher_retries() {
        let (url, hits, _) = serve(vec![500, 503, 200]).await;
        let retry = CallbackRetryPolicy {
            max_attempts: 3,
            backoff: 0.01,
        };
        let publisher = HttpCallbackPublisher::new(url).with_retry(&retry);
        publisher.publish(&CallbackEvent::new(RUN_EVENT, json!({}))).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_http_publisher_gives_up() {
        let (url, hits, _) = serve(vec![500, 500]).await;
        let retry = CallbackRetryPolicy {
            max_attempts: 2,
            backoff: 0.0,
        };
        let publisher = HttpCallbackPublisher::new(url).with_retry(&retry);
        let err = publisher.publish(&CallbackEvent::new(RUN_FAILED, json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("failed after 2 attempt(s)"), "{}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
