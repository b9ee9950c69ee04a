//! Streaming run state
//!
//! `RunResultStreaming` is the caller's handle on an in-flight run. The
//! run-impl task writes into the shared `StreamingState`; the caller reads
//! accessors and pulls events. Three error sources are polled on every pull:
//!
//! | Source           | Error                                |
//! |------------------|--------------------------------------|
//! | turn counter     | `MaxTurnsExceeded`                   |
//! | guardrail queue  | `InputGuardrailTripwireTriggered`    |
//! | background tasks | `Task { .. }`                        |
//!
//! The first error recorded wins. Once the run is marked complete no field
//! changes again.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::Stream;
use serde_json::Value;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::events::{QueueEvent, StreamEvent};
use super::queue::AsyncQueue;
use super::result::RunResult;
use super::task::BackgroundTask;
use crate::agent::Agent;
use crate::core::{AgentsError, AgentsResult, RunContext, RunErrorDetails, TaskKind};
use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use crate::items::{self, InputItem, ModelResponse, RunItem};

#[derive(Default)]
struct RunData {
    input: Vec<InputItem>,
    new_items: Vec<RunItem>,
    raw_responses: Vec<ModelResponse>,
    final_output: Option<Value>,
    input_guardrail_results: Vec<InputGuardrailResult>,
    output_guardrail_results: Vec<OutputGuardrailResult>,
    current_agent: Option<Arc<Agent>>,
}

/// State shared between the run-impl task and every result handle
pub(crate) struct StreamingState {
    data: RwLock<RunData>,
    current_turn: AtomicU64,
    max_turns: AtomicU64,
    complete: AtomicBool,
    stored_error: Mutex<Option<AgentsError>>,
    context: RunContext,

    pub(crate) event_queue: AsyncQueue<QueueEvent>,
    pub(crate) guardrail_queue: AsyncQueue<InputGuardrailResult>,

    run_impl_task: OnceLock<BackgroundTask<()>>,
    input_guardrails_task: OnceLock<BackgroundTask<()>>,
    output_guardrails_task: OnceLock<BackgroundTask<Vec<OutputGuardrailResult>>>,

    pub(crate) cancel: CancellationToken,
}

impl StreamingState {
    pub(crate) fn new(input: Vec<InputItem>, agent: Arc<Agent>, max_turns: u64, context: RunContext) -> Self {
        Self {
            data: RwLock::new(RunData {
                input,
                current_agent: Some(agent),
                ..Default::default()
            }),
            current_turn: AtomicU64::new(0),
            max_turns: AtomicU64::new(max_turns),
            complete: AtomicBool::new(false),
            stored_error: Mutex::new(None),
            context,
            event_queue: AsyncQueue::new(),
            guardrail_queue: AsyncQueue::new(),
            run_impl_task: OnceLock::new(),
            input_guardrails_task: OnceLock::new(),
            output_guardrails_task: OnceLock::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RunData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` unless the run is already complete
    fn update(&self, f: impl FnOnce(&mut RunData)) -> bool {
        let mut data = self.write();
        if self.complete.load(Ordering::SeqCst) {
            return false;
        }
        f(&mut data);
        true
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    pub(crate) fn context(&self) -> &RunContext {
        &self.context
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_complete(&self) {
        let _data = self.write();
        self.complete.store(true, Ordering::SeqCst);
    }

    /// Increment the turn counter and return the new turn
    pub(crate) fn advance_turn(&self) -> u64 {
        self.current_turn.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn set_input(&self, input: Vec<InputItem>) {
        self.update(|data| data.input = input);
    }

    pub(crate) fn set_current_agent(&self, agent: Arc<Agent>) {
        self.update(|data| data.current_agent = Some(agent));
    }

    pub(crate) fn append_items(&self, items: impl IntoIterator<Item = RunItem>) {
        self.update(|data| data.new_items.extend(items));
    }

    pub(crate) fn append_response(&self, response: ModelResponse) {
        self.update(|data| data.raw_responses.push(response));
    }

    /// Replace the generated items, used by handoff input filters
    pub(crate) fn set_new_items(&self, items: Vec<RunItem>) {
        self.update(|data| data.new_items = items);
    }

    pub(crate) fn input(&self) -> Vec<InputItem> {
        self.read().input.clone()
    }

    pub(crate) fn new_items(&self) -> Vec<RunItem> {
        self.read().new_items.clone()
    }

    /// Input of the next model call: the run input plus every generated item
    pub(crate) fn turn_input(&self) -> Vec<InputItem> {
        let data = self.read();
        items::to_input_list(&data.input, &data.new_items)
    }

    pub(crate) fn input_guardrail_results(&self) -> Vec<InputGuardrailResult> {
        self.read().input_guardrail_results.clone()
    }

    pub(crate) fn set_final_output(&self, output: Value) {
        self.update(|data| data.final_output = Some(output));
    }

    /// Record one input guardrail result, then hand it to the error funnel
    pub(crate) fn push_input_guardrail_result(&self, result: InputGuardrailResult) {
        self.update(|data| data.input_guardrail_results.push(result.clone()));
        let _ = self.guardrail_queue.push(result);
    }

    pub(crate) fn set_output_guardrail_results(&self, results: Vec<OutputGuardrailResult>) {
        self.update(|data| data.output_guardrail_results = results);
    }

    pub(crate) fn push_event(&self, event: StreamEvent) {
        if self.is_complete() {
            return;
        }
        let _ = self.event_queue.push(QueueEvent::Event(event));
    }

    /// Final queue operation of the producer
    pub(crate) fn push_complete(&self) {
        let _ = self.event_queue.push(QueueEvent::Complete);
    }

    pub(crate) fn set_run_impl_task(&self, task: BackgroundTask<()>) {
        let _ = self.run_impl_task.set(task);
    }

    pub(crate) fn set_input_guardrails_task(&self, task: BackgroundTask<()>) {
        let _ = self.input_guardrails_task.set(task);
    }

    pub(crate) fn set_output_guardrails_task(&self, task: BackgroundTask<Vec<OutputGuardrailResult>>) {
        let _ = self.output_guardrails_task.set(task);
    }

    pub(crate) fn input_guardrails_task(&self) -> Option<&BackgroundTask<()>> {
        self.input_guardrails_task.get()
    }

    pub(crate) fn output_guardrails_task(&self) -> Option<&BackgroundTask<Vec<OutputGuardrailResult>>> {
        self.output_guardrails_task.get()
    }

    // =========================================================================
    // Error funnel
    // =========================================================================

    /// Snapshot attached to run errors
    pub(crate) fn details(&self) -> RunErrorDetails {
        let data = self.read();
        RunErrorDetails {
            input: data.input.clone(),
            new_items: data.new_items.clone(),
            raw_responses: data.raw_responses.clone(),
            last_agent: data.current_agent.clone(),
            input_guardrail_results: data.input_guardrail_results.clone(),
            output_guardrail_results: data.output_guardrail_results.clone(),
        }
    }

    /// Record `err` unless an error is already stored
    fn store_error(&self, err: AgentsError) {
        let mut slot = self.stored_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            tracing::debug!(error = %err, "[StreamingRun] Stored run error");
            *slot = Some(err);
        }
    }

    pub(crate) fn stored_error(&self) -> Option<AgentsError> {
        self.stored_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn has_error(&self) -> bool {
        self.stored_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Poll the turn limit, the guardrail queue and the background tasks
    pub(crate) fn check_errors(&self) {
        let turn = self.current_turn.load(Ordering::SeqCst);
        let max_turns = self.max_turns.load(Ordering::SeqCst);
        if turn > max_turns {
            self.store_error(AgentsError::MaxTurnsExceeded {
                max_turns,
                details: Some(Box::new(self.details())),
            });
        }

        while let Some(result) = self.guardrail_queue.try_pop() {
            if result.tripwire_triggered() {
                self.store_error(AgentsError::InputGuardrailTripwireTriggered {
                    result: Box::new(result),
                    details: Some(Box::new(self.details())),
                });
            }
        }

        let failures = [
            self.run_impl_task.get().and_then(BackgroundTask::take_error),
            self.input_guardrails_task.get().and_then(BackgroundTask::take_error),
            self.output_guardrails_task.get().and_then(BackgroundTask::take_error),
        ];
        let kinds = [TaskKind::RunImpl, TaskKind::InputGuardrails, TaskKind::OutputGuardrails];
        for (kind, failure) in kinds.into_iter().zip(failures) {
            if let Some(err) = failure {
                let err = err.with_details_if_absent(|| self.details());
                self.store_error(AgentsError::task(kind, err));
            }
        }
    }

    // =========================================================================
    // Task convergence
    // =========================================================================

    fn cancel_tasks(&self) {
        self.cancel.cancel();
    }

    /// Wait for every spawned task; run-impl first since it spawns the others
    async fn wait_tasks(&self) {
        if let Some(task) = self.run_impl_task.get() {
            task.wait().await;
        }
        if let Some(task) = self.input_guardrails_task.get() {
            task.wait().await;
        }
        if let Some(task) = self.output_guardrails_task.get() {
            task.wait().await;
        }
    }

    pub(crate) fn tasks_done(&self) -> bool {
        self.run_impl_task.get().map_or(true, BackgroundTask::is_done)
            && self.input_guardrails_task.get().map_or(true, BackgroundTask::is_done)
            && self.output_guardrails_task.get().map_or(true, BackgroundTask::is_done)
    }

    fn close_queues(&self) {
        self.event_queue.drain();
        self.guardrail_queue.drain();
        self.event_queue.close();
        self.guardrail_queue.close();
    }
}

/// Marks the run complete and releases the consumer when dropped.
///
/// Moved into the run-impl future when it is spawned, so completion also
/// happens when the task is cancelled before it first runs.
pub(crate) struct CompletionGuard(pub(crate) Arc<StreamingState>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.mark_complete();
        self.0.push_complete();
    }
}

// ============================================================================
// RunResultStreaming - caller handle
// ============================================================================

/// Handle on a run that is still producing events
///
/// Clones share the same run. Dropping the last handle cancels every
/// background task of the run.
#[derive(Clone)]
pub struct RunResultStreaming {
    state: Arc<StreamingState>,
    _cancel_on_drop: Arc<DropGuard>,
}

impl RunResultStreaming {
    pub(crate) fn new(state: Arc<StreamingState>) -> Self {
        let guard = state.cancel.clone().drop_guard();
        Self {
            state,
            _cancel_on_drop: Arc::new(guard),
        }
    }

    pub(crate) fn state(&self) -> &Arc<StreamingState> {
        &self.state
    }

    // =========================================================================
    // Consumption
    // =========================================================================

    /// Next event, or `None` once the run finished or failed
    pub async fn next_event(&self) -> Option<StreamEvent> {
        let state = &self.state;
        state.check_errors();
        if state.has_error() {
            state.mark_complete();
            return None;
        }
        if state.is_complete() && state.event_queue.is_empty() {
            return None;
        }

        match state.event_queue.pop().await {
            Some(QueueEvent::Event(event)) => Some(event),
            Some(QueueEvent::Complete) | None => {
                // A task may have failed while finishing
                state.check_errors();
                None
            }
        }
    }

    /// Wait for every background task and return the run's error, if any
    pub async fn finish(&self) -> AgentsResult<()> {
        let state = &self.state;
        if state.has_error() {
            state.cancel_tasks();
        }
        state.wait_tasks().await;
        state.check_errors();
        state.mark_complete();
        state.close_queues();

        match state.stored_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Visit every event in order, then return the run's error.
    ///
    /// An error from `visit` cancels the run and is returned as
    /// `AgentsError::Consumer`; it never becomes the stored run error.
    pub async fn stream_events<F, Fut>(&self, mut visit: F) -> AgentsResult<()>
    where
        F: FnMut(StreamEvent) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        while let Some(event) = self.next_event().await {
            if let Err(err) = visit(event).await {
                tracing::debug!(error = %err, "[StreamingRun] Consumer failed, cancelling run");
                self.cancel().await;
                return Err(AgentsError::consumer(err));
            }
        }
        self.finish().await
    }

    /// Events as a stream; a failed run ends with one `Err` item
    pub fn events(&self) -> impl Stream<Item = AgentsResult<StreamEvent>> + Send + 'static {
        let handle = self.clone();
        async_stream::stream! {
            while let Some(event) = handle.next_event().await {
                yield Ok(event);
            }
            if let Err(err) = handle.finish().await {
                yield Err(err);
            }
        }
    }

    /// Stop the run. Safe to call more than once.
    pub async fn cancel(&self) {
        let state = &self.state;
        state.mark_complete();
        state.cancel_tasks();
        state.wait_tasks().await;
        state.close_queues();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn input(&self) -> Vec<InputItem> {
        self.state.input()
    }

    pub fn new_items(&self) -> Vec<RunItem> {
        self.state.new_items()
    }

    pub fn raw_responses(&self) -> Vec<ModelResponse> {
        self.state.read().raw_responses.clone()
    }

    pub fn final_output(&self) -> Option<Value> {
        self.state.read().final_output.clone()
    }

    pub fn current_agent(&self) -> Option<Arc<Agent>> {
        self.state.read().current_agent.clone()
    }

    /// Agent that was active when the run stopped
    pub fn last_agent(&self) -> Option<Arc<Agent>> {
        self.current_agent()
    }

    pub fn current_turn(&self) -> u64 {
        self.state.current_turn.load(Ordering::SeqCst)
    }

    pub fn max_turns(&self) -> u64 {
        self.state.max_turns.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    pub fn input_guardrail_results(&self) -> Vec<InputGuardrailResult> {
        self.state.input_guardrail_results()
    }

    pub fn output_guardrail_results(&self) -> Vec<OutputGuardrailResult> {
        self.state.read().output_guardrail_results.clone()
    }

    /// Error recorded so far, if any
    pub fn error(&self) -> Option<AgentsError> {
        self.state.stored_error()
    }

    pub fn context(&self) -> &RunContext {
        self.state.context()
    }

    pub fn last_response_id(&self) -> String {
        items::last_response_id(&self.state.read().raw_responses)
    }

    /// Original input followed by every new item, ready for the next run
    pub fn to_input_list(&self) -> Vec<InputItem> {
        self.state.turn_input()
    }

    /// Freeze the current state
    pub fn to_result(&self) -> RunResult {
        let data = self.state.read();
        RunResult {
            input: data.input.clone(),
            new_items: data.new_items.clone(),
            raw_responses: data.raw_responses.clone(),
            final_output: data.final_output.clone().unwrap_or(Value::Null),
            input_guardrail_results: data.input_guardrail_results.clone(),
            output_guardrail_results: data.output_guardrail_results.clone(),
            last_agent: data.current_agent.clone(),
            usage: self.state.context().usage(),
        }
    }
}

impl std::fmt::Debug for RunResultStreaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunResultStreaming")
            .field("current_turn", &self.current_turn())
            .field("max_turns", &self.max_turns())
            .field("is_complete", &self.is_complete())
            .field("current_agent", &self.current_agent().map(|a| a.name.clone()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::GuardrailFunctionOutput;
    use crate::items::Message;
    use serde_json::json;
    use std::time::Duration;

    fn new_state(max_turns: u64) -> Arc<StreamingState> {
        Arc::new(StreamingState::new(
            vec![InputItem::user("hi")],
            Arc::new(Agent::new("tester")),
            max_turns,
            RunContext::default(),
        ))
    }

    fn message_item(text: &str) -> RunItem {
        RunItem::MessageOutput {
            agent: "tester".into(),
            raw_item: Message::assistant("m", text),
        }
    }

    fn tripped(name: &str) -> InputGuardrailResult {
        InputGuardrailResult {
            guardrail_name: name.into(),
            agent_name: "tester".into(),
            output: GuardrailFunctionOutput::trip(json!({"reason": "blocked"})),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());

        for text in ["one", "two", "three"] {
            state.push_event(StreamEvent::for_item(message_item(text)));
        }
        drop(CompletionGuard(state));

        let mut seen = Vec::new();
        handle
            .stream_events(|event| {
                if let StreamEvent::RunItem { item, .. } = event {
                    seen.push(items::text_message_output(&item));
                }
                async { Ok(()) }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["one", "two", "three"]);
        assert!(handle.is_complete());
    }

    #[tokio::test]
    async fn test_turn_limit_wins_over_later_tripwire() {
        let state = new_state(1);
        let handle = RunResultStreaming::new(state.clone());

        state.advance_turn();
        state.advance_turn();
        state.guardrail_queue.push(tripped("late")).unwrap();

        assert!(handle.next_event().await.is_none());
        let err = handle.finish().await.unwrap_err();
        assert!(matches!(err, AgentsError::MaxTurnsExceeded { max_turns: 1, .. }));
        assert_eq!(err.last_agent_name(), Some("tester"));
    }

    #[tokio::test]
    async fn test_guardrail_tripwire_is_stored() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());

        state.guardrail_queue.push(tripped("no_pii")).unwrap();
        assert!(handle.next_event().await.is_none());

        match handle.finish().await.unwrap_err() {
            AgentsError::InputGuardrailTripwireTriggered { result, details } => {
                assert_eq!(result.guardrail_name, "no_pii");
                assert!(details.is_some());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_task_error_is_wrapped_with_details() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());

        let task_state = state.clone();
        let task = BackgroundTask::spawn(TaskKind::RunImpl, &state.cancel, async move {
            let _guard = CompletionGuard(task_state);
            Err(AgentsError::model_behavior("no output"))
        });
        state.set_run_impl_task(task);

        assert!(handle.next_event().await.is_none());
        let err = handle.finish().await.unwrap_err();
        match &err {
            AgentsError::Task { task, error } => {
                assert_eq!(*task, TaskKind::RunImpl);
                assert!(matches!(**error, AgentsError::ModelBehavior { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.details().is_some());
        assert!(state.tasks_done());
    }

    #[tokio::test]
    async fn test_setters_ignored_after_completion() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());

        state.append_items([message_item("kept")]);
        state.mark_complete();
        state.append_items([message_item("dropped")]);
        state.set_final_output(json!("late"));

        assert_eq!(handle.new_items().len(), 1);
        assert!(handle.final_output().is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());

        let task_state = state.clone();
        let task = BackgroundTask::spawn(TaskKind::RunImpl, &state.cancel, async move {
            let _guard = CompletionGuard(task_state);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        state.set_run_impl_task(task);
        state.push_event(StreamEvent::for_item(message_item("pending")));
        state.guardrail_queue.push(tripped("pending")).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle.cancel())
            .await
            .unwrap();
        handle.cancel().await;

        assert!(handle.is_complete());
        assert!(state.event_queue.is_empty());
        assert!(state.guardrail_queue.is_empty());
        assert!(state.tasks_done());
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_consumer_error_is_not_stored() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());
        state.push_event(StreamEvent::for_item(message_item("one")));
        state.push_event(StreamEvent::for_item(message_item("two")));

        let err = handle
            .stream_events(|_event| async { Err(anyhow::anyhow!("sink closed")) })
            .await
            .unwrap_err();

        assert!(matches!(err, AgentsError::Consumer(_)));
        assert!(handle.error().is_none());
        assert!(handle.is_complete());
    }

    #[tokio::test]
    async fn test_to_input_list_is_stable() {
        let state = new_state(10);
        let handle = RunResultStreaming::new(state.clone());
        state.append_items([message_item("answer")]);

        let first = handle.to_input_list();
        assert_eq!(first, handle.to_input_list());
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], InputItem::user("hi"));
    }
}
