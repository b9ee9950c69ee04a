//! Process-wide tracing setup
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (default `info`)
//! - `WORKFLOWRUNNER_LOG_LEVEL`: filter override, wins over `RUST_LOG`
//! - `WORKFLOWRUNNER_LOG_FILE`: write JSON lines to this file instead of
//!   compact text on stderr

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "WORKFLOWRUNNER_LOG_LEVEL";
pub const LOG_FILE_ENV: &str = "WORKFLOWRUNNER_LOG_FILE";

static INIT: OnceLock<()> = OnceLock::new();

fn env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber once; later calls do nothing
///
/// Stdout is left to the console printer, so text logs go to stderr.
pub fn init_logging() {
    INIT.get_or_init(|| {
        let filter = env_filter();
        match std::env::var(LOG_FILE_ENV).ok().filter(|p| !p.trim().is_empty()) {
            Some(raw) => {
                let path = PathBuf::from(raw);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("workflowrunner.log.jsonl");
                let writer = tracing_appender::rolling::never(dir, file_name);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
            }
            None => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
            }
        }
    });
}
