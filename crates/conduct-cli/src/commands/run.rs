//! `conduct run` - execute a workflow YAML against simulated providers.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use conduct_core::models::task::TaskStatus;
use conduct_core::models::workflow::WorkflowStatus;
use conduct_core::schema::AgentSpec;
use conduct_core::{Engine, EngineConfig, HandlerRegistry, WorkflowDefinition};

use crate::sim::SimulateHandler;

pub async fn run(file: &str, verbose: bool, timeout_secs: u64) -> Result<(), String> {
    let definition = WorkflowDefinition::from_file(file).map_err(|e| e.to_string())?;

    println!("📄 Loaded workflow: {} ({})", definition.name, file);
    println!(
        "   {} task(s), {} agent(s)",
        definition.tasks.len(),
        definition.agents.len()
    );
    println!();

    let mut registry = HandlerRegistry::new();
    registry
        .register("simulate", Arc::new(SimulateHandler::new()))
        .map_err(|e| e.to_string())?;
    let engine = Engine::start(EngineConfig::default(), registry);
    let controller = engine.controller();

    if verbose {
        engine
            .events()
            .on("cli", |event| {
                println!(
                    "   {} {:<20} {}",
                    style("•").dim(),
                    event.event_type.as_str(),
                    event.subject
                );
            })
            .await;
    }

    // A workflow without an agents block still needs something to run on.
    if definition.agents.is_empty() {
        controller
            .register_agent(&AgentSpec {
                name: "default".to_string(),
                role: "general".to_string(),
                max_concurrent: 2,
            })
            .await;
    }

    let workflow_id = controller
        .create_workflow_from_definition(&definition)
        .await
        .map_err(|e| e.to_string())?;
    controller
        .start_workflow(&workflow_id)
        .await
        .map_err(|e| e.to_string())?;

    // Poll to quiescence; on timeout, cancel what is left.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    let status = loop {
        let status = controller
            .workflow_status(&workflow_id)
            .await
            .map_err(|e| e.to_string())?;
        if status.is_terminal() {
            break status;
        }
        if tokio::time::Instant::now() >= deadline {
            controller
                .cancel_workflow(&workflow_id)
                .await
                .map_err(|e| e.to_string())?;
            engine.shutdown();
            return Err(format!("workflow timed out after {timeout_secs}s"));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    let report = controller
        .get_workflow_status(&workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    let mut tasks = engine.state().tasks.list_by_workflow(&workflow_id).await;
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    engine.shutdown();

    println!();
    println!("── {} ──", definition.name);
    for task in &tasks {
        let marker = match task.status {
            TaskStatus::Completed => style("✓").green(),
            TaskStatus::Failed => style("✗").red(),
            TaskStatus::Cancelled => style("–").yellow(),
            _ => style("?").dim(),
        };
        let duration = task
            .duration()
            .map(|d| format!(" ({}ms)", d.num_milliseconds()))
            .unwrap_or_default();
        match &task.error {
            Some(error) => println!("   {} {}{} - {}", marker, task.name, duration, error),
            None => println!("   {} {}{}", marker, task.name, duration),
        }
    }
    println!(
        "   status: {} ({} completed, {} failed, {} cancelled)",
        report.status.as_str(),
        report.task_counts.completed,
        report.task_counts.failed,
        report.task_counts.cancelled
    );

    match status {
        WorkflowStatus::Completed => {
            println!("\n🎉 Workflow completed successfully");
            Ok(())
        }
        other => Err(format!("workflow finished as {}", other.as_str())),
    }
}
