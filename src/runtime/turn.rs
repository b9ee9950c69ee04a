//! Turn loop of a run
//!
//! `RunImpl` is the body of the run-impl background task. Each turn calls
//! the model, records what it produced, runs local tools, answers MCP
//! approval requests, follows at most one handoff and then decides the next
//! step.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

use super::events::StreamEvent;
use super::runner::RunConfig;
use super::streaming::StreamingState;
use super::task::BackgroundTask;
use crate::agent::{Agent, AgentModel, HandoffInputData};
use crate::core::{AgentsError, AgentsResult, RunContext, TaskKind};
use crate::items::{
    ComputerCallOutput, FunctionCallOutput, FunctionToolCall, InputItem, LocalShellCallOutput,
    McpApprovalRequest, McpApprovalResponse, ModelResponse, OutputItem, RunItem, ToolCallKind,
    ToolOutputKind,
};
use crate::llm::{Model, ModelRequest, ResponseEvent};
use crate::tools::{McpApprovalHandler, Tool, ToolContext, ToolKind, ToolResult};

const MULTIPLE_HANDOFFS_MESSAGE: &str = "Multiple handoffs detected, ignoring this one.";

/// What the loop does after a turn
#[derive(Debug)]
pub(crate) enum NextStep {
    RunAgain,
    Handoff(Arc<Agent>),
    FinalOutput(Value),
    /// End without a final output (input guardrail tripped, approvals pending)
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum LocalCallKind {
    Function,
    Computer,
    LocalShell,
}

/// A tool call the runner executes itself
struct LocalCall {
    tool: Arc<dyn Tool>,
    call_id: String,
    arguments: String,
    kind: LocalCallKind,
}

#[derive(Default)]
struct ProcessedResponse {
    items: Vec<RunItem>,
    local_calls: Vec<LocalCall>,
    handoff_calls: Vec<FunctionToolCall>,
    approvals: Vec<(McpApprovalRequest, Arc<dyn McpApprovalHandler>)>,
    pending_approvals: usize,
}

pub(crate) struct RunImpl {
    state: Arc<StreamingState>,
    config: RunConfig,
    /// Input of this run, without session history
    run_input: Vec<InputItem>,
}

impl RunImpl {
    pub(crate) fn new(state: Arc<StreamingState>, config: RunConfig, run_input: Vec<InputItem>) -> Self {
        Self {
            state,
            config,
            run_input,
        }
    }

    /// Drive the run to completion
    pub(crate) async fn run(self, starting_agent: Arc<Agent>) -> AgentsResult<()> {
        let state = self.state.clone();
        self.run_turns(starting_agent)
            .await
            .map_err(|err| err.with_details_if_absent(|| state.details()))
    }

    async fn run_turns(&self, starting_agent: Arc<Agent>) -> AgentsResult<()> {
        let ctx = self.state.context().clone();
        self.load_history().await?;

        let mut agent = starting_agent;
        let mut announced: Option<Arc<Agent>> = None;
        let mut run_start_hooks = true;

        loop {
            if self.state.is_complete() {
                return Ok(());
            }

            let turn = self.state.advance_turn();
            if turn > self.config.max_turns {
                tracing::warn!(
                    max_turns = self.config.max_turns,
                    agent = %agent.name,
                    "[Runner] Max turns exceeded"
                );
                return Ok(());
            }

            if !announced.as_ref().is_some_and(|a| Arc::ptr_eq(a, &agent)) {
                self.state.push_event(StreamEvent::AgentUpdated {
                    new_agent: agent.clone(),
                });
                announced = Some(agent.clone());
            }

            if run_start_hooks {
                self.agent_start_hooks(&ctx, &agent).await?;
                run_start_hooks = false;
            }

            tracing::debug!(turn, agent = %agent.name, "[Runner] Starting turn");
            match self.run_single_turn(&ctx, &agent, turn).await? {
                NextStep::FinalOutput(output) => return self.finish(&ctx, &agent, output).await,
                NextStep::Handoff(next) => {
                    self.state.set_current_agent(next.clone());
                    agent = next;
                    run_start_hooks = true;
                }
                NextStep::RunAgain => {}
                NextStep::Stop => return Ok(()),
            }
        }
    }

    async fn run_single_turn(&self, ctx: &RunContext, agent: &Arc<Agent>, turn: u64) -> AgentsResult<NextStep> {
        let guarded = turn == 1 && !agent.input_guardrails.is_empty();
        if guarded {
            self.spawn_input_guardrails(ctx, agent);
        }

        let model = self.resolve_model(agent)?;
        let request = ModelRequest {
            system_instructions: agent.instructions.clone(),
            input: self.state.turn_input(),
            settings: agent.model_settings.resolve(self.config.model_settings.as_ref()),
            tools: agent.tool_definitions(),
            output_schema: agent.output_schema(),
            previous_response_id: None,
            prompt_id: agent.prompt_id.clone(),
        };

        self.llm_start_hooks(ctx, agent, &request).await?;
        let (response, withheld) = self.stream_model(model, request, guarded).await?;

        // The first turn's response stays unrecorded until the input guardrails clear
        if guarded && self.input_guardrails_tripped().await {
            tracing::info!(agent = %agent.name, "[Runner] Input guardrail stopped the run");
            return Ok(NextStep::Stop);
        }
        ctx.add_usage(&response.usage);
        self.state.append_response(response.clone());
        self.llm_end_hooks(ctx, agent, &response).await?;
        for event in withheld {
            self.state.push_event(event);
        }

        let processed = self.process_response(agent, &response)?;
        let pre_turn_items = self.state.new_items();
        let mut turn_items = processed.items.clone();
        self.record(processed.items);

        let tool_results = self.run_local_calls(ctx, agent, processed.local_calls).await?;
        let mut results = Vec::with_capacity(tool_results.len());
        for (name, result, item) in tool_results {
            turn_items.push(item.clone());
            self.record(vec![item]);
            results.push((name, result));
        }

        let answered = processed.approvals.len();
        for (request, handler) in processed.approvals {
            let item = self.answer_approval(ctx, agent, request, handler).await?;
            turn_items.push(item.clone());
            self.record(vec![item]);
        }

        if let Some(next) = self
            .run_handoff(ctx, agent, &processed.handoff_calls, pre_turn_items, turn_items)
            .await?
        {
            return Ok(NextStep::Handoff(next));
        }

        if !results.is_empty() {
            return Ok(match agent.tool_use_behavior.final_output(&results) {
                Some(output) => NextStep::FinalOutput(output),
                None => NextStep::RunAgain,
            });
        }
        if answered > 0 {
            return Ok(NextStep::RunAgain);
        }

        if let Some(text) = last_message_text(&response) {
            return match &agent.output_type {
                Some(output_type) if !output_type.is_plain_text() => {
                    let value = output_type.validate_json(&text).map_err(|e| {
                        AgentsError::model_behavior(format!(
                            "Invalid JSON when parsing {} for {}: {}",
                            text,
                            output_type.name(),
                            e
                        ))
                    })?;
                    Ok(NextStep::FinalOutput(value))
                }
                _ => Ok(NextStep::FinalOutput(Value::String(text))),
            };
        }

        if processed.pending_approvals > 0 {
            tracing::info!(
                agent = %agent.name,
                pending = processed.pending_approvals,
                "[Runner] Waiting on MCP approvals"
            );
            return Ok(NextStep::Stop);
        }

        Ok(NextStep::RunAgain)
    }

    // =========================================================================
    // Model
    // =========================================================================

    fn resolve_model(&self, agent: &Agent) -> AgentsResult<Arc<dyn Model>> {
        let provider = &self.config.model_provider;
        let resolved = match (&self.config.model, &agent.model) {
            (Some(name), _) => provider.get_model(Some(name)),
            (None, Some(AgentModel::Instance(model))) => Ok(model.clone()),
            (None, Some(AgentModel::Name(name))) => provider.get_model(Some(name)),
            (None, None) => provider.get_model(None),
        };
        resolved.map_err(|e| AgentsError::user(format!("cannot resolve model for agent {}: {}", agent.name, e)))
    }

    /// Stream one model call; events are returned instead of pushed when `withhold` is set
    async fn stream_model(
        &self,
        model: Arc<dyn Model>,
        request: ModelRequest,
        withhold: bool,
    ) -> AgentsResult<(ModelResponse, Vec<StreamEvent>)> {
        let mut stream = model.stream_response(request).await.map_err(AgentsError::model)?;
        let mut withheld = Vec::new();
        let mut completed = None;

        while let Some(event) = stream.next().await {
            let event = event.map_err(AgentsError::model)?;
            if let ResponseEvent::Completed { response } = &event {
                completed = Some(response.clone());
            }
            let event = StreamEvent::RawResponse(event);
            if withhold {
                withheld.push(event);
            } else {
                self.state.push_event(event);
            }
        }

        let response = completed
            .ok_or_else(|| AgentsError::model_behavior("model stream ended without a completed response"))?;
        Ok((response, withheld))
    }

    // =========================================================================
    // Items
    // =========================================================================

    fn process_response(&self, agent: &Agent, response: &ModelResponse) -> AgentsResult<ProcessedResponse> {
        let mut processed = ProcessedResponse::default();
        let name = || agent.name.clone();

        for output in &response.output {
            match output {
                OutputItem::Message(message) => processed.items.push(RunItem::MessageOutput {
                    agent: name(),
                    raw_item: message.clone(),
                }),
                OutputItem::FunctionCall(call) => {
                    if agent.find_handoff(&call.name).is_some() {
                        processed.items.push(RunItem::HandoffCall {
                            agent: name(),
                            raw_item: call.clone(),
                        });
                        processed.handoff_calls.push(call.clone());
                        continue;
                    }
                    let tool = agent
                        .find_tool(&call.name)
                        .filter(|t| t.kind() == ToolKind::Function)
                        .ok_or_else(|| {
                            AgentsError::model_behavior(format!(
                                "Tool {} not found in agent {}",
                                call.name, agent.name
                            ))
                        })?;
                    processed.items.push(RunItem::ToolCall {
                        agent: name(),
                        raw_item: ToolCallKind::FunctionCall(call.clone()),
                    });
                    processed.local_calls.push(LocalCall {
                        tool: tool.clone(),
                        call_id: call.call_id.clone(),
                        arguments: call.arguments.clone(),
                        kind: LocalCallKind::Function,
                    });
                }
                OutputItem::ComputerCall(call) => {
                    let tool = find_tool_of_kind(agent, ToolKind::Computer).ok_or_else(|| {
                        AgentsError::model_behavior("Model produced computer action without a computer tool")
                    })?;
                    processed.items.push(RunItem::ToolCall {
                        agent: name(),
                        raw_item: ToolCallKind::ComputerCall(call.clone()),
                    });
                    processed.local_calls.push(LocalCall {
                        tool,
                        call_id: call.call_id.clone(),
                        arguments: call.action.to_string(),
                        kind: LocalCallKind::Computer,
                    });
                }
                OutputItem::LocalShellCall(call) => {
                    let tool = find_tool_of_kind(agent, ToolKind::LocalShell).ok_or_else(|| {
                        AgentsError::model_behavior("Model produced local shell call without a local shell tool")
                    })?;
                    let arguments = serde_json::to_string(&call.action)
                        .map_err(|e| AgentsError::model_behavior(format!("invalid local shell action: {}", e)))?;
                    processed.items.push(RunItem::ToolCall {
                        agent: name(),
                        raw_item: ToolCallKind::LocalShellCall(call.clone()),
                    });
                    processed.local_calls.push(LocalCall {
                        tool,
                        call_id: call.call_id.clone(),
                        arguments,
                        kind: LocalCallKind::LocalShell,
                    });
                }
                OutputItem::FileSearchCall(call) => processed.items.push(RunItem::ToolCall {
                    agent: name(),
                    raw_item: ToolCallKind::FileSearchCall(call.clone()),
                }),
                OutputItem::WebSearchCall(call) => processed.items.push(RunItem::ToolCall {
                    agent: name(),
                    raw_item: ToolCallKind::WebSearchCall(call.clone()),
                }),
                OutputItem::CodeInterpreterCall(call) => processed.items.push(RunItem::ToolCall {
                    agent: name(),
                    raw_item: ToolCallKind::CodeInterpreterCall(call.clone()),
                }),
                OutputItem::ImageGenerationCall(call) => processed.items.push(RunItem::ToolCall {
                    agent: name(),
                    raw_item: ToolCallKind::ImageGenerationCall(call.clone()),
                }),
                OutputItem::McpCall(call) => processed.items.push(RunItem::ToolCall {
                    agent: name(),
                    raw_item: ToolCallKind::McpCall(call.clone()),
                }),
                OutputItem::Reasoning(reasoning) => processed.items.push(RunItem::Reasoning {
                    agent: name(),
                    raw_item: reasoning.clone(),
                }),
                OutputItem::McpListTools(list) => processed.items.push(RunItem::McpListTools {
                    agent: name(),
                    raw_item: list.clone(),
                }),
                OutputItem::McpApprovalRequest(request) => {
                    processed.items.push(RunItem::McpApprovalRequest {
                        agent: name(),
                        raw_item: request.clone(),
                    });
                    let handler = agent
                        .tools
                        .iter()
                        .filter_map(|t| t.as_hosted_mcp())
                        .find(|mcp| mcp.server_label == request.server_label)
                        .and_then(|mcp| mcp.approval_handler().cloned());
                    match handler {
                        Some(handler) => processed.approvals.push((request.clone(), handler)),
                        None => processed.pending_approvals += 1,
                    }
                }
            }
        }

        Ok(processed)
    }

    /// Append items to the run and announce them, in order
    fn record(&self, items: Vec<RunItem>) {
        let events: Vec<StreamEvent> = items.iter().cloned().map(StreamEvent::for_item).collect();
        self.state.append_items(items);
        for event in events {
            self.state.push_event(event);
        }
    }

    // =========================================================================
    // Tools, approvals and handoffs
    // =========================================================================

    async fn run_local_calls(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        calls: Vec<LocalCall>,
    ) -> AgentsResult<Vec<(String, ToolResult, RunItem)>> {
        let runs = calls.into_iter().map(|call| self.run_local_call(ctx, agent, call));
        futures::future::try_join_all(runs).await
    }

    async fn run_local_call(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        call: LocalCall,
    ) -> AgentsResult<(String, ToolResult, RunItem)> {
        let tool = call.tool.as_ref();
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_tool_start(ctx, agent, tool)
                .await
                .map_err(|e| AgentsError::hook("on_tool_start", e))?;
        }
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_tool_start(ctx, agent, tool, &call.arguments)
                .await
                .map_err(|e| AgentsError::hook("on_tool_start", e))?;
        }

        let tool_ctx = ToolContext {
            run: ctx.clone(),
            model_provider: self.config.model_provider.clone(),
            agent_name: agent.name.clone(),
            call_id: call.call_id.clone(),
            cancel: self.state.cancel.child_token(),
        };
        tracing::debug!(tool = %tool.name(), call_id = %call.call_id, "[Runner] Invoking tool");
        let result = tool
            .invoke(&tool_ctx, &call.arguments)
            .await
            .map_err(|e| AgentsError::tool(tool.name(), e))?;
        let text = result.output_text();
        if result.is_error {
            tracing::debug!(tool = %tool.name(), "[Runner] Tool reported an error: {}", text);
        }

        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_tool_end(ctx, agent, tool, &text)
                .await
                .map_err(|e| AgentsError::hook("on_tool_end", e))?;
        }
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_tool_end(ctx, agent, tool, &text)
                .await
                .map_err(|e| AgentsError::hook("on_tool_end", e))?;
        }

        let raw_item = match call.kind {
            LocalCallKind::Function => ToolOutputKind::FunctionCallOutput(FunctionCallOutput {
                call_id: call.call_id,
                output: text,
            }),
            LocalCallKind::Computer => ToolOutputKind::ComputerCallOutput(ComputerCallOutput {
                call_id: call.call_id,
                output: result.output.clone(),
            }),
            LocalCallKind::LocalShell => ToolOutputKind::LocalShellCallOutput(LocalShellCallOutput {
                id: call.call_id,
                output: text,
            }),
        };
        let item = RunItem::ToolCallOutput {
            agent: agent.name.clone(),
            raw_item,
            output: result.output.clone(),
        };
        Ok((tool.name().to_string(), result, item))
    }

    async fn answer_approval(
        &self,
        ctx: &RunContext,
        agent: &Agent,
        request: McpApprovalRequest,
        handler: Arc<dyn McpApprovalHandler>,
    ) -> AgentsResult<RunItem> {
        let decision = handler
            .on_approval_request(ctx, &request)
            .await
            .map_err(|e| AgentsError::tool(request.server_label.clone(), e))?;
        tracing::info!(
            server = %request.server_label,
            tool = %request.name,
            approve = decision.approve,
            "[Runner] MCP approval answered"
        );
        Ok(RunItem::McpApprovalResponse {
            agent: agent.name.clone(),
            raw_item: McpApprovalResponse {
                approval_request_id: request.id,
                approve: decision.approve,
                reason: decision.reason,
            },
        })
    }

    /// Follow the first handoff call; later ones are answered with an error output
    async fn run_handoff(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        calls: &[FunctionToolCall],
        pre_turn_items: Vec<RunItem>,
        mut turn_items: Vec<RunItem>,
    ) -> AgentsResult<Option<Arc<Agent>>> {
        let Some((first, extra)) = calls.split_first() else {
            return Ok(None);
        };

        for call in extra {
            let item = RunItem::ToolCallOutput {
                agent: agent.name.clone(),
                raw_item: ToolOutputKind::FunctionCallOutput(FunctionCallOutput {
                    call_id: call.call_id.clone(),
                    output: MULTIPLE_HANDOFFS_MESSAGE.to_string(),
                }),
                output: Value::String(MULTIPLE_HANDOFFS_MESSAGE.to_string()),
            };
            turn_items.push(item.clone());
            self.record(vec![item]);
        }

        let handoff = agent
            .find_handoff(&first.name)
            .ok_or_else(|| AgentsError::model_behavior(format!("Handoff {} not found in agent {}", first.name, agent.name)))?;
        let target = handoff.resolve()?;
        tracing::info!(from = %agent.name, to = %target.name, "[Runner] Handoff");

        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_handoff(ctx, agent, &target)
                .await
                .map_err(|e| AgentsError::hook("on_handoff", e))?;
        }
        if let Some(hooks) = &target.hooks {
            hooks
                .on_handoff(ctx, &target, agent)
                .await
                .map_err(|e| AgentsError::hook("on_handoff", e))?;
        }

        let item = RunItem::HandoffOutput {
            agent: agent.name.clone(),
            raw_item: InputItem::FunctionCallOutput(FunctionCallOutput {
                call_id: first.call_id.clone(),
                output: handoff.transfer_message(),
            }),
            source_agent: agent.name.clone(),
            target_agent: target.name.clone(),
        };
        turn_items.push(item.clone());
        self.record(vec![item]);

        let filter = handoff
            .input_filter
            .clone()
            .or_else(|| self.config.handoff_input_filter.clone());
        if let Some(filter) = filter {
            let filtered = filter(HandoffInputData {
                input_history: self.state.input(),
                pre_handoff_items: pre_turn_items,
                new_items: turn_items,
            });
            self.state.set_input(filtered.input_history);
            self.state.set_new_items(
                filtered
                    .pre_handoff_items
                    .into_iter()
                    .chain(filtered.new_items)
                    .collect(),
            );
        }

        Ok(Some(target))
    }

    // =========================================================================
    // Guardrails
    // =========================================================================

    fn spawn_input_guardrails(&self, ctx: &RunContext, agent: &Arc<Agent>) {
        let state = self.state.clone();
        let ctx = ctx.clone();
        let agent = agent.clone();
        let input = self.state.turn_input();

        let task = BackgroundTask::spawn(TaskKind::InputGuardrails, &self.state.cancel, async move {
            let (ctx_ref, agent_ref, input_ref) = (&ctx, &agent, &input);
            let mut pending: FuturesUnordered<_> = agent
                .input_guardrails
                .iter()
                .map(|guardrail| async move {
                    (guardrail.name.clone(), guardrail.run(ctx_ref, agent_ref, input_ref).await)
                })
                .collect();

            while let Some((name, outcome)) = pending.next().await {
                let result = outcome.map_err(|e| AgentsError::guardrail(name, e))?;
                state.push_input_guardrail_result(result);
            }
            Ok(())
        });
        self.state.set_input_guardrails_task(task);
    }

    /// Wait for the input guardrails; true when the run must stop
    async fn input_guardrails_tripped(&self) -> bool {
        let Some(task) = self.state.input_guardrails_task() else {
            return false;
        };
        task.wait().await;
        if self.state.is_complete() || task.error().is_some() || task.is_cancelled() {
            return true;
        }
        self.state
            .input_guardrail_results()
            .iter()
            .any(|result| result.tripwire_triggered())
    }

    /// Run output guardrails as their own task; true when the output may be kept
    async fn run_output_guardrails(&self, ctx: &RunContext, agent: &Arc<Agent>, output: &Value) -> bool {
        if agent.output_guardrails.is_empty() {
            return true;
        }

        let state = self.state.clone();
        let ctx = ctx.clone();
        let agent = agent.clone();
        let output = output.clone();
        let task = BackgroundTask::spawn(TaskKind::OutputGuardrails, &self.state.cancel, async move {
            let (ctx_ref, agent_ref, output_ref) = (&ctx, &agent, &output);
            let checks = agent.output_guardrails.iter().map(|guardrail| async move {
                guardrail
                    .run(ctx_ref, agent_ref, output_ref)
                    .await
                    .map_err(|e| AgentsError::guardrail(guardrail.name.clone(), e))
            });
            let results = futures::future::try_join_all(checks).await?;
            state.set_output_guardrail_results(results.clone());

            if let Some(tripped) = results.iter().find(|r| r.tripwire_triggered()) {
                return Err(AgentsError::OutputGuardrailTripwireTriggered {
                    result: Box::new(tripped.clone()),
                    details: None,
                });
            }
            Ok(results)
        });
        self.state.set_output_guardrails_task(task);

        let Some(task) = self.state.output_guardrails_task() else {
            return false;
        };
        task.wait().await;
        task.error().is_none() && !task.is_cancelled()
    }

    // =========================================================================
    // Completion
    // =========================================================================

    async fn finish(&self, ctx: &RunContext, agent: &Arc<Agent>, output: Value) -> AgentsResult<()> {
        if !self.run_output_guardrails(ctx, agent, &output).await {
            tracing::info!(agent = %agent.name, "[Runner] Output guardrails rejected the final output");
            return Ok(());
        }

        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_agent_end(ctx, agent, &output)
                .await
                .map_err(|e| AgentsError::hook("on_agent_end", e))?;
        }
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_end(ctx, agent, &output)
                .await
                .map_err(|e| AgentsError::hook("on_end", e))?;
        }

        self.state.set_final_output(output);
        self.save_history().await?;
        tracing::info!(agent = %agent.name, "[Runner] Run completed");
        Ok(())
    }

    async fn load_history(&self) -> AgentsResult<()> {
        let Some(session) = &self.config.session else {
            return Ok(());
        };
        let mut input = session
            .get_items(self.config.history_limit)
            .await
            .map_err(AgentsError::session)?;
        if input.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            session_id = %session.session_id(),
            items = input.len(),
            "[Runner] Loaded session history"
        );
        input.extend(self.run_input.iter().cloned());
        self.state.set_input(input);
        Ok(())
    }

    async fn save_history(&self) -> AgentsResult<()> {
        let Some(session) = &self.config.session else {
            return Ok(());
        };
        let mut items = self.run_input.clone();
        items.extend(self.state.new_items().iter().map(RunItem::to_input_item));
        session.add_items(&items).await.map_err(AgentsError::session)
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    async fn agent_start_hooks(&self, ctx: &RunContext, agent: &Agent) -> AgentsResult<()> {
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_agent_start(ctx, agent)
                .await
                .map_err(|e| AgentsError::hook("on_agent_start", e))?;
        }
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_start(ctx, agent)
                .await
                .map_err(|e| AgentsError::hook("on_start", e))?;
        }
        Ok(())
    }

    async fn llm_start_hooks(&self, ctx: &RunContext, agent: &Agent, request: &ModelRequest) -> AgentsResult<()> {
        let system_prompt = request.system_instructions.as_deref();
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_llm_start(ctx, agent, system_prompt, &request.input)
                .await
                .map_err(|e| AgentsError::hook("on_llm_start", e))?;
        }
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_llm_start(ctx, agent, system_prompt, &request.input)
                .await
                .map_err(|e| AgentsError::hook("on_llm_start", e))?;
        }
        Ok(())
    }

    async fn llm_end_hooks(&self, ctx: &RunContext, agent: &Agent, response: &ModelResponse) -> AgentsResult<()> {
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_llm_end(ctx, agent, response)
                .await
                .map_err(|e| AgentsError::hook("on_llm_end", e))?;
        }
        if let Some(hooks) = &agent.hooks {
            hooks
                .on_llm_end(ctx, agent, response)
                .await
                .map_err(|e| AgentsError::hook("on_llm_end", e))?;
        }
        Ok(())
    }
}

fn find_tool_of_kind(agent: &Agent, kind: ToolKind) -> Option<Arc<dyn Tool>> {
    agent.tools.iter().find(|t| t.kind() == kind).cloned()
}

fn last_message_text(response: &ModelResponse) -> Option<String> {
    response.output.iter().rev().find_map(|item| match item {
        OutputItem::Message(message) => Some(message.text()),
        _ => None,
    })
}
