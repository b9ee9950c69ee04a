//! Manifest builder
//!
//! Turns a validated `WorkflowRequest` into runnable agents and a `Runner`.
//! Anything a manifest refers to by name (function tools, computer
//! providers, shell executors, hooks, guardrails, output types, extractors,
//! handoff filters, session stores) must be registered on the `Builder`
//! first.
//!
//! Agents are created in an order where every agent-tool target exists
//! before the agent that wraps it. Handoffs are resolved lazily through an
//! `AgentDirectory`, so handoff graphs may contain cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use super::template::render_instructions;
use super::types::{
    config_str, AgentDeclaration, GuardrailDeclaration, McpDeclaration, ModelDeclaration, OutputTypeDeclaration,
    ToolDeclaration, ToolUseBehaviorDeclaration, WorkflowRequest,
};
use super::validate::validate_workflow_request;
use crate::agent::{
    remove_all_tools, Agent, AgentDirectory, Handoff, HandoffInputFilter, JsonObjectOutputType, OutputType,
    SchemaOutputType, ToolUseBehavior,
};
use crate::core::{WorkflowError, WorkflowResult};
use crate::guardrail::{GuardrailMode, InputGuardrail, OutputGuardrail};
use crate::hooks::{AgentHooks, CombinedAgentHooks, CombinedRunHooks, RunHooks, ToolScopedHooks};
use crate::llm::{ModelProvider, ModelSettings, ReasoningSettings, Verbosity};
use crate::runtime::{RunConfig, Runner};
use crate::session::{Session, SessionFactory, SessionRegistry};
use crate::tools::{
    AgentTool, AgentToolOptions, HostedMcpTool, HostedTool, LocalShellExecutor, LocalShellTool, OutputExtractor,
    Tool,
};

/// Where a tool is being built
#[derive(Debug, Clone, Default)]
pub struct ToolFactoryEnv {
    pub agent_name: String,
    pub workflow_name: String,
    pub request_metadata: Map<String, Value>,
}

/// Creates a tool from its declaration
pub type ToolFactory = Arc<dyn Fn(&ToolDeclaration, &ToolFactoryEnv) -> Result<Arc<dyn Tool>> + Send + Sync>;

pub type InputGuardrailFactory = Arc<dyn Fn(&GuardrailDeclaration) -> Result<InputGuardrail> + Send + Sync>;

pub type OutputGuardrailFactory = Arc<dyn Fn(&GuardrailDeclaration) -> Result<OutputGuardrail> + Send + Sync>;

pub type OutputTypeFactory = Arc<dyn Fn(&OutputTypeDeclaration) -> Result<Arc<dyn OutputType>> + Send + Sync>;

/// Everything needed to run a manifest
pub struct BuildResult {
    pub starting_agent: Arc<Agent>,
    /// Agents keyed by declaration name
    pub agents: HashMap<String, Arc<Agent>>,
    pub runner: Runner,
    /// Present only when the request carried no inputs
    pub session: Option<Arc<dyn Session>>,
    pub workflow_name: String,
    pub trace_metadata: HashMap<String, String>,
}

impl std::fmt::Debug for BuildResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut agents: Vec<&String> = self.agents.keys().collect();
        agents.sort();
        f.debug_struct("BuildResult")
            .field("workflow_name", &self.workflow_name)
            .field("starting_agent", &self.starting_agent.name)
            .field("agents", &agents)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

/// Registries consulted while building a manifest
#[derive(Clone)]
pub struct Builder {
    tool_factories: HashMap<String, ToolFactory>,
    hosted_mcp_factories: HashMap<String, ToolFactory>,
    function_tools: HashMap<String, ToolFactory>,
    computer_providers: HashMap<String, ToolFactory>,
    shell_executors: HashMap<String, Arc<dyn LocalShellExecutor>>,
    agent_tool_extractors: HashMap<String, OutputExtractor>,
    agent_hooks: HashMap<String, Arc<dyn AgentHooks>>,
    run_hooks: HashMap<String, Arc<dyn RunHooks>>,
    input_guardrails: HashMap<String, InputGuardrailFactory>,
    output_guardrails: HashMap<String, OutputGuardrailFactory>,
    output_types: HashMap<String, OutputTypeFactory>,
    handoff_filters: HashMap<String, HandoffInputFilter>,
    sessions: SessionRegistry,
    model_provider: Option<Arc<dyn ModelProvider>>,
}

impl Builder {
    /// Builder with the builtin hosted tools, `json_object` output type,
    /// `remove_all_tools` handoff filter and local session store
    pub fn new() -> Self {
        let mut builder = Self::empty();
        builder.tool_factories.insert("web_search".into(), Arc::new(web_search_tool));
        builder.tool_factories.insert("file_search".into(), Arc::new(file_search_tool));
        builder
            .tool_factories
            .insert("code_interpreter".into(), Arc::new(code_interpreter_tool));
        builder
            .tool_factories
            .insert("image_generation".into(), Arc::new(image_generation_tool));
        builder.output_types.insert(
            "json_object".into(),
            Arc::new(|_: &OutputTypeDeclaration| -> Result<Arc<dyn OutputType>> { Ok(Arc::new(JsonObjectOutputType)) }),
        );
        builder
            .handoff_filters
            .insert("remove_all_tools".into(), Arc::new(remove_all_tools));
        builder.sessions = SessionRegistry::with_defaults();
        builder
    }

    /// Builder with no registrations at all
    pub fn empty() -> Self {
        Self {
            tool_factories: HashMap::new(),
            hosted_mcp_factories: HashMap::new(),
            function_tools: HashMap::new(),
            computer_providers: HashMap::new(),
            shell_executors: HashMap::new(),
            agent_tool_extractors: HashMap::new(),
            agent_hooks: HashMap::new(),
            run_hooks: HashMap::new(),
            input_guardrails: HashMap::new(),
            output_guardrails: HashMap::new(),
            output_types: HashMap::new(),
            handoff_filters: HashMap::new(),
            sessions: SessionRegistry::new(),
            model_provider: None,
        }
    }

    /// Register a factory for a custom tool `type`
    pub fn with_tool_type(mut self, tool_type: impl Into<String>, factory: ToolFactory) -> Self {
        self.tool_factories.insert(tool_type.into().to_lowercase(), factory);
        self
    }

    /// Register a function tool under its reference name
    pub fn with_function_tool(mut self, name: impl Into<String>, factory: ToolFactory) -> Self {
        self.function_tools.insert(name.into(), factory);
        self
    }

    pub fn with_computer_tool(mut self, provider: impl Into<String>, factory: ToolFactory) -> Self {
        self.computer_providers.insert(provider.into(), factory);
        self
    }

    pub fn with_local_shell_executor(
        mut self,
        name: impl Into<String>,
        executor: Arc<dyn LocalShellExecutor>,
    ) -> Self {
        self.shell_executors.insert(name.into(), executor);
        self
    }

    /// Register a hosted MCP server by label; a tool whose `type` is the
    /// label also resolves to it
    pub fn with_hosted_mcp_tool(mut self, label: impl Into<String>, factory: ToolFactory) -> Self {
        self.hosted_mcp_factories.insert(label.into().to_lowercase(), factory);
        self
    }

    pub fn with_agent_tool_extractor(mut self, name: impl Into<String>, extractor: OutputExtractor) -> Self {
        self.agent_tool_extractors.insert(name.into(), extractor);
        self
    }

    pub fn with_agent_hooks(mut self, name: impl Into<String>, hooks: Arc<dyn AgentHooks>) -> Self {
        self.agent_hooks.insert(name.into(), hooks);
        self
    }

    pub fn with_run_hooks(mut self, name: impl Into<String>, hooks: Arc<dyn RunHooks>) -> Self {
        self.run_hooks.insert(name.into(), hooks);
        self
    }

    pub fn with_input_guardrail(mut self, name: impl Into<String>, factory: InputGuardrailFactory) -> Self {
        self.input_guardrails.insert(name.into().to_lowercase(), factory);
        self
    }

    pub fn with_output_guardrail(mut self, name: impl Into<String>, factory: OutputGuardrailFactory) -> Self {
        self.output_guardrails.insert(name.into().to_lowercase(), factory);
        self
    }

    pub fn with_output_type(mut self, name: impl Into<String>, factory: OutputTypeFactory) -> Self {
        self.output_types.insert(name.into(), factory);
        self
    }

    pub fn with_handoff_filter(mut self, name: impl Into<String>, filter: HandoffInputFilter) -> Self {
        self.handoff_filters.insert(name.into(), filter);
        self
    }

    /// Register a session store selectable through `persistent_store`
    pub fn with_session_store(mut self, store: impl Into<String>, factory: SessionFactory) -> Self {
        self.sessions.register(store, factory);
        self
    }

    /// Store used when a request names none
    pub fn with_default_session_store(mut self, store: impl Into<String>) -> Self {
        self.sessions.set_default_store(store);
        self
    }

    /// Provider placed on the built `RunConfig`
    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    /// Validate `request` and build its agents and runner
    pub fn build(&self, request: &WorkflowRequest) -> WorkflowResult<BuildResult> {
        validate_workflow_request(request)?;
        let workflow = &request.workflow;

        let session = if request.inputs.is_empty() {
            let session = self
                .sessions
                .open(&request.session.persistent_store, &request.session.session_id)
                .map_err(|e| WorkflowError::build(format!("create session: {:#}", e)))?;
            Some(session)
        } else {
            None
        };

        let directory = AgentDirectory::new();
        let mut agents: HashMap<String, Arc<Agent>> = HashMap::with_capacity(workflow.agents.len());
        for index in agent_tool_order(&workflow.agents)? {
            let decl = &workflow.agents[index];
            let agent = self.build_agent(request, decl, &agents, &directory)?;
            agents.insert(decl.name.clone(), Arc::new(agent));
        }

        let starting_agent = agents.get(&workflow.starting_agent).cloned().ok_or_else(|| {
            WorkflowError::build(format!("starting agent {:?} missing", workflow.starting_agent))
        })?;

        // Handoff targets are looked up by the name the model sees
        let by_label: HashMap<String, Arc<Agent>> =
            agents.values().map(|agent| (agent.name.clone(), agent.clone())).collect();
        directory.publish(by_label);

        let mut config = RunConfig::default().with_workflow_name(workflow.name.clone());
        if let Some(provider) = &self.model_provider {
            config = config.with_model_provider(provider.clone());
        }
        if request.session.max_turns > 0 {
            config = config.with_max_turns(request.session.max_turns as u64);
        }
        let hook_names: Vec<&String> = workflow
            .on_start
            .iter()
            .chain(&workflow.on_finish)
            .chain(&workflow.on_error)
            .collect();
        if let Some(hooks) = self
            .run_hooks_for(&hook_names)
            .map_err(|e| WorkflowError::build(format!("workflow {:?} hooks: {}", workflow.name, e)))?
        {
            config = config.with_hooks(hooks);
        }
        if let Some(session) = &session {
            config = config.with_session(session.clone());
            if request.session.history_size > 0 {
                config = config.with_history_limit(request.session.history_size as usize);
            }
        }
        if !request.session.session_id.is_empty() {
            config = config.with_group_id(request.session.session_id.clone());
        }
        let trace_metadata = trace_metadata(request);
        config = config.with_trace_metadata(trace_metadata.clone());

        tracing::debug!(
            workflow = %workflow.name,
            agents = agents.len(),
            has_session = session.is_some(),
            "[Builder] Workflow built"
        );

        Ok(BuildResult {
            starting_agent,
            agents,
            runner: Runner::new(config),
            session,
            workflow_name: workflow.name.clone(),
            trace_metadata,
        })
    }

    fn build_agent(
        &self,
        request: &WorkflowRequest,
        decl: &AgentDeclaration,
        built: &HashMap<String, Arc<Agent>>,
        directory: &AgentDirectory,
    ) -> WorkflowResult<Agent> {
        let fail = |what: &str, e: &dyn std::fmt::Display| WorkflowError::build(format!("agent {:?} {}: {}", decl.name, what, e));

        let mut agent = Agent::new(decl.label());
        if !decl.handoff_description.is_empty() {
            agent = agent.with_handoff_description(decl.handoff_description.clone());
        }
        if !decl.instructions.is_empty() {
            let instructions = render_instructions(request, decl).map_err(|e| fail("instructions", &e))?;
            if !instructions.trim().is_empty() {
                agent = agent.with_instructions(instructions);
            }
        }
        if !decl.prompt_id.is_empty() {
            agent = agent.with_prompt_id(decl.prompt_id.clone());
        }
        if let Some(model) = &decl.model {
            let settings = model_settings(model).map_err(|e| fail("model", &e))?;
            agent = agent.with_model(model.model.clone()).with_model_settings(settings);
        }
        if let Some(output_type) = &decl.output_type {
            let output_type = self.output_type(output_type).map_err(|e| fail("output type", &e))?;
            agent = agent.with_output_type(output_type);
        }
        for guardrail in &decl.input_guardrails {
            let guardrail = self.input_guardrail(guardrail).map_err(|e| fail("input guardrails", &e))?;
            agent = agent.with_input_guardrail(guardrail);
        }
        for guardrail in &decl.output_guardrails {
            let guardrail = self.output_guardrail(guardrail).map_err(|e| fail("output guardrails", &e))?;
            agent = agent.with_output_guardrail(guardrail);
        }
        if let Some(behavior) = tool_use_behavior(decl.tool_use_behavior.as_ref()).map_err(|e| fail("tool_use_behavior", &e))? {
            agent = agent.with_tool_use_behavior(behavior);
        }

        let mut hooks = self.agent_hooks_for(&decl.hooks).map_err(|e| fail("hooks", &e))?;

        for handoff_decl in &decl.handoffs {
            let target = request.workflow.agent(&handoff_decl.agent).ok_or_else(|| {
                WorkflowError::build(format!(
                    "agent {:?} references unknown handoff agent {:?}",
                    decl.name, handoff_decl.agent
                ))
            })?;
            let description = (!target.handoff_description.is_empty()).then_some(target.handoff_description.as_str());
            let mut handoff = Handoff::deferred(directory.clone(), target.label(), description);
            if !handoff_decl.instructions.trim().is_empty() {
                handoff = handoff.with_tool_description(handoff_decl.instructions.trim());
            }
            if !handoff_decl.input_filter.is_empty() {
                let filter = self.handoff_filters.get(&handoff_decl.input_filter).ok_or_else(|| {
                    WorkflowError::build(format!(
                        "agent {:?} handoff {:?} input_filter {:?} not registered",
                        decl.name, handoff_decl.agent, handoff_decl.input_filter
                    ))
                })?;
                handoff = handoff.with_input_filter(filter.clone());
            }
            agent = agent.with_handoff(handoff);
        }

        for reference in &decl.agent_tools {
            let target = built.get(&reference.agent_name).ok_or_else(|| {
                WorkflowError::build(format!(
                    "agent {:?} agent_tool references unknown agent {:?}",
                    decl.name, reference.agent_name
                ))
            })?;
            let mut options = AgentToolOptions::default();
            if !reference.tool_name.is_empty() {
                options = options.with_tool_name(reference.tool_name.clone());
            }
            if !reference.description.is_empty() {
                options = options.with_tool_description(reference.description.clone());
            }
            let extractor_name = reference.output_extractor.trim();
            if !extractor_name.is_empty() {
                let extractor = self.agent_tool_extractors.get(extractor_name).ok_or_else(|| {
                    WorkflowError::build(format!(
                        "agent {:?} agent_tool {:?} output_extractor {:?} not registered",
                        decl.name, reference.agent_name, extractor_name
                    ))
                })?;
                options = options.with_output_extractor(extractor.clone());
            }
            agent = agent.with_tool(Arc::new(AgentTool::new(target.clone(), options)));
        }

        let env = ToolFactoryEnv {
            agent_name: decl.name.clone(),
            workflow_name: request.workflow.name.clone(),
            request_metadata: request.metadata.clone(),
        };
        let mcp_tools = tools_from_mcp(&decl.mcp_servers);
        for tool_decl in decl.tools.iter().chain(&mcp_tools) {
            let tool = self
                .build_tool(tool_decl, &env)
                .map_err(|e| fail(&format!("tool {:?}", tool_decl.tool_type), &format!("{:#}", e)))?;
            let tool_hooks = self
                .agent_hooks_for(&tool_decl.hooks)
                .map_err(|e| fail(&format!("tool {:?} hooks", tool.name()), &e))?;
            for inner in tool_hooks {
                hooks.push(Arc::new(ToolScopedHooks::for_tool(tool.name(), inner)));
            }
            agent = agent.with_tool(tool);
        }

        match hooks.len() {
            0 => {}
            1 => agent = agent.with_hooks(hooks.remove(0)),
            _ => agent = agent.with_hooks(Arc::new(CombinedAgentHooks::new(hooks))),
        }
        Ok(agent)
    }

    fn build_tool(&self, decl: &ToolDeclaration, env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
        let tool_type = decl.tool_type.trim().to_lowercase();
        match tool_type.as_str() {
            "function" => self.function_tool(decl, env),
            "computer" => self.computer_tool(decl, env),
            "local_shell" => self.local_shell_tool(decl),
            "hosted_mcp" => {
                let label = match config_str(&decl.config, "server_label") {
                    "" => decl.name.as_str(),
                    label => label,
                };
                match self.hosted_mcp_factories.get(&label.to_lowercase()) {
                    Some(factory) => factory(decl, env),
                    None => hosted_mcp_tool(decl, env),
                }
            }
            other => match self
                .tool_factories
                .get(other)
                .or_else(|| self.hosted_mcp_factories.get(other))
            {
                Some(factory) => factory(decl, env),
                None => bail!("tool type {:?} not registered", decl.tool_type),
            },
        }
    }

    fn function_tool(&self, decl: &ToolDeclaration, env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
        let reference = decl.function_name().trim();
        if reference.is_empty() {
            bail!("function tool requires function_ref or name");
        }
        let Some(factory) = self.function_tools.get(reference) else {
            bail!("function tool {:?} not registered", reference);
        };
        factory(decl, env).map_err(|e| anyhow::anyhow!("function tool {:?}: {:#}", reference, e))
    }

    fn computer_tool(&self, decl: &ToolDeclaration, env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
        let provider = match decl.config_str("provider") {
            "" => decl.name.trim(),
            provider => provider,
        };
        if provider.is_empty() {
            bail!("computer tool requires config.provider or name");
        }
        let Some(factory) = self.computer_providers.get(provider) else {
            bail!("computer tool provider {:?} not registered", provider);
        };
        factory(decl, env).map_err(|e| anyhow::anyhow!("computer tool {:?}: {:#}", provider, e))
    }

    fn local_shell_tool(&self, decl: &ToolDeclaration) -> Result<Arc<dyn Tool>> {
        let reference = match decl.config_str("executor_ref") {
            "" => decl.name.trim(),
            reference => reference,
        };
        if reference.is_empty() {
            bail!("local_shell tool requires config.executor_ref or name");
        }
        let Some(executor) = self.shell_executors.get(reference) else {
            bail!("local shell executor {:?} not registered", reference);
        };
        Ok(Arc::new(LocalShellTool::new(executor.clone())))
    }

    fn output_type(&self, decl: &OutputTypeDeclaration) -> Result<Arc<dyn OutputType>> {
        if let Some(schema) = &decl.schema {
            let name = if decl.name.is_empty() { "inline_schema" } else { decl.name.as_str() };
            return Ok(Arc::new(SchemaOutputType::new(name, schema.clone()).with_strict(decl.strict)));
        }
        let name = if decl.name.is_empty() { decl.preset_ref.as_str() } else { decl.name.as_str() };
        match self.output_types.get(name) {
            Some(factory) => factory(decl),
            None => bail!("output type {:?} not registered", name),
        }
    }

    fn input_guardrail(&self, decl: &GuardrailDeclaration) -> Result<InputGuardrail> {
        let Some(factory) = self.input_guardrails.get(&decl.name.trim().to_lowercase()) else {
            bail!("input guardrail {:?} not registered", decl.name);
        };
        Ok(factory(decl)?.with_mode(guardrail_mode(decl)?))
    }

    fn output_guardrail(&self, decl: &GuardrailDeclaration) -> Result<OutputGuardrail> {
        let Some(factory) = self.output_guardrails.get(&decl.name.trim().to_lowercase()) else {
            bail!("output guardrail {:?} not registered", decl.name);
        };
        Ok(factory(decl)?.with_mode(guardrail_mode(decl)?))
    }

    fn agent_hooks_for(&self, names: &[String]) -> Result<Vec<Arc<dyn AgentHooks>>, String> {
        unique_non_empty(names.iter())
            .into_iter()
            .map(|name| {
                self.agent_hooks
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("agent hook {:?} not registered", name))
            })
            .collect()
    }

    fn run_hooks_for(&self, names: &[&String]) -> Result<Option<Arc<dyn RunHooks>>, String> {
        let mut hooks = unique_non_empty(names.iter().copied())
            .into_iter()
            .map(|name| {
                self.run_hooks
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("run hook {:?} not registered", name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match hooks.len() {
            0 => None,
            1 => Some(hooks.remove(0)),
            _ => Some(Arc::new(CombinedRunHooks::new(hooks))),
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn sorted(mut keys: Vec<&String>) -> Vec<&String> {
            keys.sort();
            keys
        }
        f.debug_struct("Builder")
            .field("tool_types", &sorted(self.tool_factories.keys().collect()))
            .field("function_tools", &sorted(self.function_tools.keys().collect()))
            .field("hosted_mcp", &sorted(self.hosted_mcp_factories.keys().collect()))
            .field("sessions", &self.sessions)
            .finish()
    }
}

/// Indices of `agents` ordered so agent-tool targets come first
fn agent_tool_order(agents: &[AgentDeclaration]) -> WorkflowResult<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Fresh,
        Visiting,
        Done,
    }

    fn visit(
        index: usize,
        agents: &[AgentDeclaration],
        positions: &HashMap<&str, usize>,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> WorkflowResult<()> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                return Err(WorkflowError::build(format!(
                    "agent {:?} agent_tools form a cycle",
                    agents[index].name
                )))
            }
            Mark::Fresh => {}
        }
        marks[index] = Mark::Visiting;
        for reference in &agents[index].agent_tools {
            if let Some(&target) = positions.get(reference.agent_name.as_str()) {
                visit(target, agents, positions, marks, order)?;
            }
        }
        marks[index] = Mark::Done;
        order.push(index);
        Ok(())
    }

    let positions: HashMap<&str, usize> = agents.iter().enumerate().map(|(i, a)| (a.name.as_str(), i)).collect();
    let mut marks = vec![Mark::Fresh; agents.len()];
    let mut order = Vec::with_capacity(agents.len());
    for index in 0..agents.len() {
        visit(index, agents, &positions, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn model_settings(decl: &ModelDeclaration) -> Result<ModelSettings, String> {
    let provider = decl.provider.trim();
    if !provider.is_empty() && !provider.eq_ignore_ascii_case("openai") {
        return Err(format!(
            "provider {:?} not supported (only openai is available in this build)",
            decl.provider
        ));
    }
    if decl.model.trim().is_empty() {
        return Err("model name cannot be empty".into());
    }

    let mut settings = ModelSettings {
        temperature: decl.temperature,
        top_p: decl.top_p,
        max_tokens: decl.max_tokens,
        parallel_tool_calls: decl.parallel_tool_calls,
        metadata: decl.metadata.clone(),
        extra_headers: decl.extra_headers.clone(),
        extra_query: decl.extra_query.clone(),
        ..Default::default()
    };
    if !decl.verbosity.is_empty() {
        settings.verbosity =
            Some(Verbosity::parse(&decl.verbosity).ok_or_else(|| format!("unsupported verbosity {:?}", decl.verbosity))?);
    }
    if let Some(reasoning) = &decl.reasoning {
        settings.reasoning = Some(ReasoningSettings {
            effort: non_empty_lower(&reasoning.effort),
            summary: non_empty_lower(&reasoning.summary),
            tokens: (reasoning.tokens > 0).then_some(reasoning.tokens),
        });
    }
    if !decl.tool_choice.trim().is_empty() {
        settings.tool_choice = Some(decl.tool_choice.trim().to_string());
    }
    if !decl.truncation.trim().is_empty() {
        settings.truncation = Some(decl.truncation.trim().to_string());
    }
    Ok(settings)
}

fn tool_use_behavior(decl: Option<&ToolUseBehaviorDeclaration>) -> Result<Option<ToolUseBehavior>, String> {
    let Some(decl) = decl else {
        return Ok(None);
    };
    match decl.mode.trim().to_lowercase().as_str() {
        "" | "default" => Ok(None),
        "run_llm_again" => Ok(Some(ToolUseBehavior::RunLlmAgain)),
        "stop_on_first_tool" => Ok(Some(ToolUseBehavior::StopOnFirstTool)),
        "stop_at_tools" => Ok(Some(ToolUseBehavior::StopAtTools(decl.tool_names.clone()))),
        "custom" => Err(format!("custom tool_use_behavior handler {:?} not supported yet", decl.handler)),
        _ => Err(format!("unsupported mode {:?}", decl.mode)),
    }
}

fn guardrail_mode(decl: &GuardrailDeclaration) -> Result<GuardrailMode> {
    match GuardrailMode::parse(&decl.mode) {
        Some(mode) => Ok(mode),
        None => bail!("guardrail {:?} mode {:?} not supported", decl.name, decl.mode),
    }
}

/// MCP servers are declared separately but built as `hosted_mcp` tools
fn tools_from_mcp(servers: &[McpDeclaration]) -> Vec<ToolDeclaration> {
    servers
        .iter()
        .map(|server| {
            let mut config = Map::new();
            config.insert("server_label".into(), json!(server.server_label));
            config.insert("server_url".into(), json!(server.address));
            if !server.require_approval.is_empty() {
                config.insert("require_approval".into(), json!(server.require_approval));
            }
            for (key, value) in &server.additional {
                config.insert(key.clone(), value.clone());
            }
            ToolDeclaration {
                tool_type: "hosted_mcp".into(),
                name: server.server_label.clone(),
                config,
                ..Default::default()
            }
        })
        .collect()
}

fn trace_metadata(request: &WorkflowRequest) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("workflow_name".to_string(), request.workflow.name.clone());
    metadata.insert("session_id".to_string(), request.session.session_id.clone());
    let credentials = &request.session.credentials;
    if !credentials.user_id.is_empty() {
        metadata.insert("user_id".to_string(), credentials.user_id.clone());
    }
    if !credentials.account_id.is_empty() {
        metadata.insert("account_id".to_string(), credentials.account_id.clone());
    }
    for (key, value) in &request.metadata {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        metadata.insert(format!("metadata.{}", key), value);
    }
    metadata
}

fn unique_non_empty<'a>(names: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    names
        .map(|name| name.trim())
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .collect()
}

fn non_empty_lower(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_lowercase())
}

// ============================================================================
// Builtin hosted tool factories
// ============================================================================

fn web_search_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    let user_location = decl.config.get("user_location").cloned();
    let context_size = decl.config_str("search_context_size");
    let context_size = (!context_size.is_empty()).then(|| context_size.to_string());
    Ok(Arc::new(HostedTool::web_search(user_location, context_size)))
}

fn file_search_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    let vector_store_ids: Vec<String> = decl
        .config
        .get("vector_store_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if vector_store_ids.is_empty() {
        bail!("file_search requires config.vector_store_ids");
    }
    let max_num_results = decl.config.get("max_num_results").and_then(Value::as_u64);
    let include_search_results = decl
        .config
        .get("include_search_results")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(Arc::new(HostedTool::file_search(
        vector_store_ids,
        max_num_results,
        include_search_results,
    )))
}

fn code_interpreter_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    let container = decl
        .config
        .get("container")
        .cloned()
        .unwrap_or_else(|| json!({"type": "auto"}));
    Ok(Arc::new(HostedTool::code_interpreter(container)))
}

fn image_generation_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(HostedTool::image_generation(Value::Object(decl.config.clone()))))
}

/// Hosted MCP tool configured entirely from the declaration
pub fn hosted_mcp_tool(decl: &ToolDeclaration, _env: &ToolFactoryEnv) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(hosted_mcp_from_declaration(decl, "")?))
}

/// Shared by label-specific factories that add an approval handler
pub fn hosted_mcp_from_declaration(decl: &ToolDeclaration, default_url: &str) -> Result<HostedMcpTool> {
    let label = match decl.config_str("server_label") {
        "" => decl.name.trim(),
        label => label,
    };
    if label.is_empty() {
        bail!("hosted_mcp requires config.server_label or name");
    }
    let url = match decl.config_str("server_url") {
        "" => default_url,
        url => url,
    };
    if url.is_empty() {
        bail!("hosted_mcp {:?} requires config.server_url", label);
    }

    let require = decl
        .approval_flow
        .as_ref()
        .map(|flow| flow.require.trim())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| decl.config_str("require_approval"));
    let mut tool = HostedMcpTool::new(label, url);
    if !require.is_empty() {
        tool = tool.with_require_approval(require.to_lowercase());
    }
    if let Some(headers) = decl.config.get("headers").and_then(Value::as_object) {
        let headers = headers
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect();
        tool = tool.with_headers(headers);
    }
    if let Some(allowed) = decl.config.get("allowed_tools").and_then(Value::as_array) {
        tool = tool.with_allowed_tools(allowed.iter().filter_map(Value::as_str).map(str::to_string).collect());
    }
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::GuardrailFunctionOutput;
    use crate::manifest::types::{
        AgentHandoffDeclaration, AgentHandoffDeclarations, AgentToolReference, CallbackDeclaration,
        InstructionDeclaration, WorkflowInput,
    };
    use crate::session::MemorySession;
    use crate::tools::{FunctionTool, ToolKind};

    fn agent_decl(name: &str) -> AgentDeclaration {
        AgentDeclaration {
            name: name.into(),
            instructions: InstructionDeclaration::text(format!("You are {}", name)),
            ..Default::default()
        }
    }

    fn request(agents: Vec<AgentDeclaration>) -> WorkflowRequest {
        let mut request = WorkflowRequest {
            query: "hello".into(),
            inputs: vec![WorkflowInput {
                input_type: "text".into(),
                content: Some(json!("hello")),
                ..Default::default()
            }],
            callback: CallbackDeclaration::stdout(),
            ..Default::default()
        };
        request.session.session_id = "s-1".into();
        request.session.credentials.user_id = "u-1".into();
        request.session.credentials.account_id = "a-1".into();
        request.workflow.name = "demo".into();
        request.workflow.starting_agent = agents[0].name.clone();
        request.workflow.agents = agents;
        request
    }

    fn weather_factory() -> ToolFactory {
        Arc::new(|_: &ToolDeclaration, _: &ToolFactoryEnv| -> Result<Arc<dyn Tool>> {
            Ok(Arc::new(FunctionTool::new(
                "get_weather",
                "Weather for a city",
                json!({"type": "object"}),
                |_ctx, _args| async move { Ok::<_, anyhow::Error>(json!("sunny")) },
            )))
        })
    }

    #[test]
    fn test_builds_handoff_graph_with_cycle() {
        let mut triage = agent_decl("triage");
        triage.handoffs = AgentHandoffDeclarations(vec![AgentHandoffDeclaration::to("billing")]);
        let mut billing = agent_decl("billing");
        billing.display_name = "Billing Agent".into();
        billing.handoffs = AgentHandoffDeclarations(vec![AgentHandoffDeclaration::to("triage")]);

        let result = Builder::new().build(&request(vec![triage, billing])).unwrap();
        assert_eq!(result.starting_agent.name, "triage");
        assert_eq!(result.starting_agent.instructions.as_deref(), Some("You are triage"));
        assert!(result.session.is_none());

        let handoff = &result.starting_agent.handoffs[0];
        assert_eq!(handoff.tool_name, "transfer_to_billing_agent");
        assert_eq!(handoff.resolve().unwrap().name, "Billing Agent");

        let back = &result.agents["billing"].handoffs[0];
        assert!(Arc::ptr_eq(&back.resolve().unwrap(), &result.starting_agent));
    }

    #[test]
    fn test_agent_tools_built_before_their_users() {
        let mut orchestrator = agent_decl("orchestrator");
        orchestrator.agent_tools = vec![AgentToolReference {
            agent_name: "translator".into(),
            tool_name: "translate".into(),
            ..Default::default()
        }];
        let result = Builder::new()
            .build(&request(vec![orchestrator, agent_decl("translator")]))
            .unwrap();
        let tool = &result.starting_agent.tools[0];
        assert_eq!(tool.name(), "translate");
        assert_eq!(tool.kind(), ToolKind::Function);
    }

    #[test]
    fn test_agent_tool_cycle_is_rejected() {
        let mut a = agent_decl("a");
        a.agent_tools = vec![AgentToolReference {
            agent_name: "b".into(),
            ..Default::default()
        }];
        let mut b = agent_decl("b");
        b.agent_tools = vec![AgentToolReference {
            agent_name: "a".into(),
            ..Default::default()
        }];
        let err = Builder::new().build(&request(vec![a, b])).unwrap_err();
        assert!(err.to_string().contains("agent_tools form a cycle"), "{}", err);
    }

    #[test]
    fn test_function_tools_and_mcp_servers() {
        let mut agent = agent_decl("assistant");
        agent.tools = vec![ToolDeclaration {
            tool_type: "function".into(),
            name: "get_weather".into(),
            ..Default::default()
        }];
        agent.mcp_servers = vec![McpDeclaration {
            server_label: "docs".into(),
            address: "https://mcp.example.com".into(),
            require_approval: "always".into(),
            ..Default::default()
        }];

        let err = Builder::new().build(&request(vec![agent.clone()])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "agent \"assistant\" tool \"function\": function tool \"get_weather\" not registered"
        );

        let result = Builder::new()
            .with_function_tool("get_weather", weather_factory())
            .build(&request(vec![agent]))
            .unwrap();
        let names: Vec<&str> = result.starting_agent.tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["get_weather", "docs"]);
        assert_eq!(result.starting_agent.tools[1].kind(), ToolKind::HostedMcp);
    }

    #[test]
    fn test_tool_hooks_are_scoped_to_their_tool() {
        struct Audit;
        impl AgentHooks for Audit {}

        let mut agent = agent_decl("assistant");
        agent.tools = vec![ToolDeclaration {
            tool_type: "function".into(),
            name: "get_weather".into(),
            hooks: vec!["audit".into()],
            ..Default::default()
        }];

        let err = Builder::new()
            .with_function_tool("get_weather", weather_factory())
            .build(&request(vec![agent.clone()]))
            .unwrap_err();
        assert!(
            err.to_string().contains("tool \"get_weather\" hooks: agent hook \"audit\" not registered"),
            "{}",
            err
        );

        let result = Builder::new()
            .with_function_tool("get_weather", weather_factory())
            .with_agent_hooks("audit", Arc::new(Audit))
            .build(&request(vec![agent]))
            .unwrap();
        assert!(result.starting_agent.hooks.is_some());
    }

    #[test]
    fn test_model_guardrails_and_output_type() {
        let mut agent = agent_decl("assistant");
        agent.model = Some(ModelDeclaration {
            model: "gpt-4o".into(),
            temperature: Some(0.2),
            verbosity: "High".into(),
            ..Default::default()
        });
        agent.output_type = Some(OutputTypeDeclaration {
            name: "json_object".into(),
            ..Default::default()
        });
        agent.output_guardrails = vec![GuardrailDeclaration {
            name: "PII".into(),
            mode: "monitor".into(),
            ..Default::default()
        }];

        let builder = Builder::new().with_output_guardrail(
            "pii",
            Arc::new(|decl: &GuardrailDeclaration| -> Result<OutputGuardrail> {
                Ok(OutputGuardrail::from_fn(decl.name.clone(), |_ctx, _agent, _output| async move {
                    Ok(GuardrailFunctionOutput::pass(json!(null)))
                }))
            }),
        );
        let result = builder.build(&request(vec![agent])).unwrap();
        let agent = &result.starting_agent;
        assert_eq!(agent.model_settings.temperature, Some(0.2));
        assert_eq!(agent.model_settings.verbosity, Some(Verbosity::High));
        assert_eq!(agent.output_type.as_ref().map(|o| o.name().to_string()), Some("json_object".into()));
        assert_eq!(agent.output_guardrails[0].mode, GuardrailMode::Monitor);
    }

    #[test]
    fn test_unsupported_provider_and_custom_behavior() {
        let mut agent = agent_decl("assistant");
        agent.model = Some(ModelDeclaration {
            provider: "anthropic".into(),
            model: "claude".into(),
            ..Default::default()
        });
        let err = Builder::new().build(&request(vec![agent])).unwrap_err();
        assert!(err.to_string().contains("provider \"anthropic\" not supported"), "{}", err);

        let mut agent = agent_decl("assistant");
        agent.tool_use_behavior = Some(ToolUseBehaviorDeclaration {
            mode: "custom".into(),
            handler: "mine".into(),
            ..Default::default()
        });
        let err = Builder::new().build(&request(vec![agent])).unwrap_err();
        assert!(err.to_string().contains("custom tool_use_behavior handler \"mine\""), "{}", err);
    }

    #[test]
    fn test_run_config_and_session() {
        let mut request = request(vec![agent_decl("assistant")]);
        request.inputs.clear();
        request.session.max_turns = 4;
        request.session.history_size = 6;
        request.workflow.on_start = vec!["audit".into()];
        request.workflow.on_finish = vec!["audit".into(), "metrics".into()];

        struct Noop;
        impl RunHooks for Noop {}

        let err = Builder::new()
            .with_session_store(
                "sqlite",
                Arc::new(|id: &str| -> Result<Arc<dyn Session>> { Ok(Arc::new(MemorySession::new(id))) }),
            )
            .with_run_hooks("audit", Arc::new(Noop))
            .build(&request)
            .unwrap_err();
        assert_eq!(err.to_string(), "workflow \"demo\" hooks: run hook \"metrics\" not registered");

        let result = Builder::new()
            .with_session_store(
                "sqlite",
                Arc::new(|id: &str| -> Result<Arc<dyn Session>> { Ok(Arc::new(MemorySession::new(id))) }),
            )
            .with_run_hooks("audit", Arc::new(Noop))
            .with_run_hooks("metrics", Arc::new(Noop))
            .build(&request)
            .unwrap();
        let config = result.runner.config();
        assert_eq!(config.max_turns, 4);
        assert_eq!(config.history_limit, Some(6));
        assert_eq!(config.group_id.as_deref(), Some("s-1"));
        assert!(config.hooks.is_some());
        assert_eq!(result.session.as_ref().map(|s| s.session_id().to_string()), Some("s-1".into()));
        assert_eq!(result.trace_metadata["user_id"], "u-1");
        assert_eq!(result.trace_metadata["workflow_name"], "demo");
    }
}
