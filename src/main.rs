use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;

use agent_workflow_runner::demo::register_demo_resources;
use agent_workflow_runner::llm::{EchoModel, StaticModelProvider};
use agent_workflow_runner::logging;
use agent_workflow_runner::manifest::{Builder, CallbackDeclaration, WorkflowRequest};
use agent_workflow_runner::service::RunnerService;

const DEFAULT_MANIFEST: &str = "manifests/basic_hello_world.json";

#[tokio::main]
async fn main() {
    logging::init_logging();

    if let Err(e) = run().await {
        eprintln!("workflow manifest runner: {:#}", e);
        std::process::exit(1);
    }
}

/// Manifest path and whether stdout callbacks are forced
fn resolve_config() -> (String, bool) {
    let args: Vec<String> = std::env::args().collect();

    let mut path = args.get(1).map(|a| a.trim().to_string()).unwrap_or_default();
    if path.is_empty() {
        path = std::env::var("WORKFLOW_MANIFEST").unwrap_or_default().trim().to_string();
    }
    if path.is_empty() {
        path = DEFAULT_MANIFEST.to_string();
    }

    let use_stdout = match args.get(2) {
        Some(arg) => arg.eq_ignore_ascii_case("stdout"),
        None => std::env::var("WORKFLOWRUNNER_STDOUT")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false),
    };
    (path, use_stdout)
}

fn read_manifest(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    Ok(std::fs::read_to_string(path)?)
}

async fn run() -> Result<()> {
    let (path, use_stdout) = resolve_config();
    tracing::info!(manifest = %path, use_stdout, "[RunManifest] Loading manifest");

    let text = read_manifest(&path).context("read manifest")?;
    let mut request = WorkflowRequest::from_json(&text).context("decode manifest")?;
    if use_stdout {
        request.callback = CallbackDeclaration::stdout();
        request.callbacks.clear();
    }

    let provider = Arc::new(StaticModelProvider::new(Arc::new(EchoModel::new())));
    let builder = register_demo_resources(Builder::new().with_model_provider(provider));
    let service = RunnerService::new(builder);

    let task = service.execute(request).context("execute workflow")?;
    let summary = task.await.context("run task")?.context("run failed")?;

    println!(
        "{} {}",
        format!("Workflow {}", summary.workflow_name).bold(),
        "completed.".green().bold()
    );
    if let Some(output) = &summary.final_output {
        match output {
            serde_json::Value::String(text) => println!("Final output: {}", text),
            other => println!("Final output: {}", other),
        }
    }
    if !summary.last_response_id.is_empty() {
        println!("Last response id: {}", summary.last_response_id);
    }
    Ok(())
}
