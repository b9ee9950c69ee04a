use colored::*;
use serde_json::Value;

use crate::items::{text_message_output, RunItem, ToolCallKind};
use crate::runtime::StreamEvent;

/// Longest tool output shown before truncation
const MAX_TOOL_OUTPUT: usize = 500;

/// Prints run progress to the terminal when a stdout callback is declared
///
/// A disabled printer ignores everything. Tool calls and tool outputs are
/// only shown in verbose mode (`stdout_verbose`).
#[derive(Debug, Clone)]
pub struct ConsolePrinter {
    enabled: bool,
    verbose: bool,
    agent_color: Color,
    tool_color: Color,
}

impl ConsolePrinter {
    pub fn new(enabled: bool, verbose: bool) -> Self {
        Self {
            enabled,
            verbose,
            agent_color: Color::Green,
            tool_color: Color::Magenta,
        }
    }

    /// A printer that prints nothing
    pub fn disabled() -> Self {
        Self::new(false, false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on_run_started(&self, query: &str) {
        if !self.enabled {
            return;
        }
        println!("{}", "=".repeat(60).bright_blue());
        println!("{} {}", "Run started:".bright_blue().bold(), query);
        println!("{}", "=".repeat(60).bright_blue());
    }

    pub fn on_stream_event(&self, event: &StreamEvent) {
        if !self.enabled {
            return;
        }
        if let Some(line) = self.render_event(event) {
            println!("{}", line);
        }
    }

    pub fn on_run_completed(&self, final_output: Option<&Value>, agent_name: Option<&str>) {
        if !self.enabled {
            return;
        }
        println!("{}", "-".repeat(60).bright_black());
        let agent = agent_name.unwrap_or("unknown");
        match final_output {
            Some(output) => println!(
                "{} {} {}",
                "Completed".green().bold(),
                format!("[{}]", agent).color(self.agent_color),
                display_value(output)
            ),
            None => println!(
                "{} {}",
                "Completed".green().bold(),
                format!("[{}] without final output", agent).color(self.agent_color)
            ),
        }
    }

    pub fn on_run_failed(&self, error: &dyn std::fmt::Display) {
        if !self.enabled {
            return;
        }
        eprintln!("{} {}", "Run failed:".red().bold(), error);
    }

    /// One console line for `event`, or `None` when it is not shown
    fn render_event(&self, event: &StreamEvent) -> Option<String> {
        match event {
            StreamEvent::RawResponse(_) => None,
            StreamEvent::AgentUpdated { new_agent } => Some(format!(
                "{} {}",
                "Agent:".yellow().bold(),
                new_agent.name.color(self.agent_color).bold()
            )),
            StreamEvent::RunItem { item, .. } => self.render_item(item),
        }
    }

    fn render_item(&self, item: &RunItem) -> Option<String> {
        match item {
            RunItem::MessageOutput { agent, .. } => Some(format!(
                "{} {}",
                format!("{}:", agent).color(self.agent_color).bold(),
                text_message_output(item)
            )),
            RunItem::HandoffOutput {
                source_agent,
                target_agent,
                ..
            } => Some(format!(
                "{} {} -> {}",
                "Handoff:".yellow().bold(),
                source_agent,
                target_agent.color(self.agent_color)
            )),
            RunItem::McpApprovalRequest { raw_item, .. } => Some(format!(
                "{} {} ({}) {}",
                "Approval requested:".yellow().bold(),
                raw_item.name.color(self.tool_color),
                raw_item.server_label,
                raw_item.arguments.bright_black()
            )),
            RunItem::ToolCall { raw_item, .. } if self.verbose => {
                let name = match raw_item {
                    ToolCallKind::FunctionCall(call) => call.name.as_str(),
                    ToolCallKind::McpCall(call) => call.name.as_str(),
                    other => other.label(),
                };
                Some(format!(
                    "{} {}",
                    "Tool:".color(self.tool_color).bold(),
                    format!("[{}]", name).color(self.tool_color)
                ))
            }
            RunItem::ToolCallOutput { output, .. } if self.verbose => {
                let text = display_value(output);
                let text = if text.len() > MAX_TOOL_OUTPUT {
                    let cut = (0..=MAX_TOOL_OUTPUT).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
                    format!("{}...\n(output truncated)", &text[..cut])
                } else {
                    text
                };
                Some(text.bright_black().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ConsolePrinter {
    fn default() -> Self {
        Self::disabled()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
