//! Background tasks of a streamed run
//!
//! A `BackgroundTask` owns one spawned future running under a child
//! cancellation token. Its outcome is recorded once; the error is reported
//! to the error funnel at most once through `take_error`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentsError, AgentsResult, TaskKind};

/// How a background task ended
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Value(T),
    Failed(AgentsError),
    Cancelled,
}

struct TaskSlot<T> {
    outcome: Option<TaskOutcome<T>>,
    error_reported: bool,
}

/// Handle to a spawned unit of work
pub struct BackgroundTask<T> {
    kind: TaskKind,
    cancel: CancellationToken,
    slot: Arc<Mutex<TaskSlot<T>>>,
    done: watch::Receiver<bool>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Spawn `fut` on the runtime under a child of `parent`
    pub fn spawn<F>(kind: TaskKind, parent: &CancellationToken, fut: F) -> Self
    where
        F: Future<Output = AgentsResult<T>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let slot = Arc::new(Mutex::new(TaskSlot {
            outcome: None,
            error_reported: false,
        }));
        let (done_tx, done) = watch::channel(false);

        let token = cancel.clone();
        let task_slot = slot.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => TaskOutcome::Cancelled,
                result = AssertUnwindSafe(fut).catch_unwind() => match result {
                    Ok(Ok(value)) => TaskOutcome::Value(value),
                    Ok(Err(err)) => TaskOutcome::Failed(err),
                    Err(_) => {
                        tracing::error!(task = %kind, "[BackgroundTask] Task panicked");
                        TaskOutcome::Failed(AgentsError::internal(format!("{} task panicked", kind)))
                    }
                },
            };

            match &outcome {
                TaskOutcome::Failed(err) => {
                    tracing::debug!(task = %kind, error = %err, "[BackgroundTask] Task failed")
                }
                TaskOutcome::Cancelled => tracing::debug!(task = %kind, "[BackgroundTask] Task cancelled"),
                TaskOutcome::Value(_) => tracing::trace!(task = %kind, "[BackgroundTask] Task finished"),
            }

            task_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .outcome = Some(outcome);
            let _ = done_tx.send(true);
        });

        Self {
            kind,
            cancel,
            slot,
            done,
        }
    }
}

impl<T> BackgroundTask<T> {
    fn lock(&self) -> MutexGuard<'_, TaskSlot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Ask the task to stop at its next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the task has recorded its outcome
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // A dropped sender means the spawned future is gone
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// The task's error, handed out only once
    pub fn take_error(&self) -> Option<AgentsError> {
        let mut slot = self.lock();
        if slot.error_reported {
            return None;
        }
        match &slot.outcome {
            Some(TaskOutcome::Failed(err)) => {
                let err = err.clone();
                slot.error_reported = true;
                Some(err)
            }
            _ => None,
        }
    }

    /// The task's error without consuming the report
    pub fn error(&self) -> Option<AgentsError> {
        match &self.lock().outcome {
            Some(TaskOutcome::Failed(err)) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.lock().outcome, Some(TaskOutcome::Cancelled))
    }

    /// Move the successful value out, if any
    pub fn take_value(&self) -> Option<T> {
        let mut slot = self.lock();
        match slot.outcome.take() {
            Some(TaskOutcome::Value(value)) => Some(value),
            other => {
                slot.outcome = other;
                None
            }
        }
    }
}

impl<T> std::fmt::Debug for BackgroundTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("kind", &self.kind)
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_value_outcome() {
        let root = CancellationToken::new();
        let task = BackgroundTask::spawn(TaskKind::RunImpl, &root, async { Ok(7) });
        task.wait().await;

        assert!(task.is_done());
        assert!(task.take_error().is_none());
        assert_eq!(task.take_value(), Some(7));
        assert_eq!(task.take_value(), None);
    }

    #[tokio::test]
    async fn test_error_reported_once() {
        let root = CancellationToken::new();
        let task: BackgroundTask<()> = BackgroundTask::spawn(TaskKind::InputGuardrails, &root, async {
            Err(AgentsError::model_behavior("bad output"))
        });
        task.wait().await;

        assert!(task.error().is_some());
        assert!(matches!(task.take_error(), Some(AgentsError::ModelBehavior { .. })));
        assert!(task.take_error().is_none());
        assert!(task.error().is_some());
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_task() {
        let root = CancellationToken::new();
        let task: BackgroundTask<()> = BackgroundTask::spawn(TaskKind::RunImpl, &root, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), task.wait())
            .await
            .unwrap();
        assert!(task.is_cancelled());
        assert!(task.take_error().is_none());
    }

    fn should_panic() -> bool {
        true
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let root = CancellationToken::new();
        let task: BackgroundTask<()> = BackgroundTask::spawn(TaskKind::OutputGuardrails, &root, async {
            if should_panic() {
                panic!("boom");
            }
            Ok(())
        });
        task.wait().await;

        assert!(matches!(task.take_error(), Some(AgentsError::Internal { .. })));
    }
}
