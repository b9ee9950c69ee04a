//! Computer-use tool
//!
//! The model issues screen actions (click, type, scroll, ...). The runner
//! forwards each action to a `Computer` implementation and answers with a
//! base64 PNG screenshot of the resulting screen.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::tool::{Tool, ToolContext, ToolKind, ToolResult};
use crate::llm::ToolDefinition;

/// A screen the model can drive
#[async_trait]
pub trait Computer: Send + Sync {
    /// `browser`, `mac`, `windows` or `ubuntu`
    fn environment(&self) -> &str;

    /// Display width and height in pixels
    fn dimensions(&self) -> (u32, u32);

    /// PNG bytes of the current screen
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn click(&self, x: i64, y: i64, button: &str) -> Result<()>;

    async fn double_click(&self, x: i64, y: i64) -> Result<()>;

    async fn scroll(&self, x: i64, y: i64, scroll_x: i64, scroll_y: i64) -> Result<()>;

    async fn type_text(&self, text: &str) -> Result<()>;

    async fn wait(&self) -> Result<()>;

    async fn move_to(&self, x: i64, y: i64) -> Result<()>;

    async fn keypress(&self, keys: &[String]) -> Result<()>;

    async fn drag(&self, path: &[(i64, i64)]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Point {
    x: i64,
    y: i64,
}

/// One action as sent by the model
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ComputerAction {
    Click {
        x: i64,
        y: i64,
        #[serde(default = "default_button")]
        button: String,
    },
    DoubleClick {
        x: i64,
        y: i64,
    },
    Scroll {
        x: i64,
        y: i64,
        #[serde(default)]
        scroll_x: i64,
        #[serde(default)]
        scroll_y: i64,
    },
    Type {
        text: String,
    },
    Wait,
    Move {
        x: i64,
        y: i64,
    },
    Keypress {
        keys: Vec<String>,
    },
    Drag {
        path: Vec<Point>,
    },
    Screenshot,
}

fn default_button() -> String {
    "left".to_string()
}

/// Tool that drives a `Computer`
#[derive(Clone)]
pub struct ComputerTool {
    computer: Arc<dyn Computer>,
}

impl ComputerTool {
    pub fn new(computer: Arc<dyn Computer>) -> Self {
        Self { computer }
    }

    async fn perform(&self, action: ComputerAction) -> Result<()> {
        let computer = &self.computer;
        match action {
            ComputerAction::Click { x, y, button } => computer.click(x, y, &button).await,
            ComputerAction::DoubleClick { x, y } => computer.double_click(x, y).await,
            ComputerAction::Scroll {
                x,
                y,
                scroll_x,
                scroll_y,
            } => computer.scroll(x, y, scroll_x, scroll_y).await,
            ComputerAction::Type { text } => computer.type_text(&text).await,
            ComputerAction::Wait => computer.wait().await,
            ComputerAction::Move { x, y } => computer.move_to(x, y).await,
            ComputerAction::Keypress { keys } => computer.keypress(&keys).await,
            ComputerAction::Drag { path } => {
                let path: Vec<(i64, i64)> = path.into_iter().map(|p| (p.x, p.y)).collect();
                computer.drag(&path).await
            }
            ComputerAction::Screenshot => Ok(()),
        }
    }
}

impl std::fmt::Debug for ComputerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputerTool")
            .field("environment", &self.computer.environment())
            .finish()
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &str {
        "computer_use_preview"
    }

    fn description(&self) -> &str {
        "Control a computer screen"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Computer
    }

    fn definition(&self) -> ToolDefinition {
        let (display_width, display_height) = self.computer.dimensions();
        ToolDefinition::Computer {
            environment: self.computer.environment().to_string(),
            display_width,
            display_height,
        }
    }

    async fn invoke(&self, ctx: &ToolContext, arguments: &str) -> Result<ToolResult> {
        let action: ComputerAction =
            serde_json::from_str(arguments).context("Invalid computer action")?;
        tracing::debug!(call_id = %ctx.call_id, ?action, "[ComputerTool] Performing action");

        self.perform(action).await?;
        let png = self.computer.screenshot().await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);

        Ok(ToolResult::success(json!({
            "type": "computer_screenshot",
            "image_url": format!("data:image/png;base64,{}", encoded),
        })))
    }
}
