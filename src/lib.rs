pub mod core;
pub mod items;
pub mod runtime;
pub mod session;
pub mod tools;

// Agents, handoffs and structured outputs
pub mod agent;

// Input and output checks
pub mod guardrail;

// Hooks for observing runs and agents
pub mod hooks;

// Model interface plus offline models
pub mod llm;

// Declarative manifests and the builder that wires them
pub mod manifest;

// Background execution, callbacks and session state
pub mod service;

// Optional components
pub mod cli;
pub mod demo;
pub mod logging;
