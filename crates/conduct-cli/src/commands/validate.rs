//! `conduct validate` - check a workflow YAML without executing it.
//!
//! Runs the full creation-time validation (unknown dependencies,
//! duplicate ids, unregistered kinds, cycles) against a throwaway
//! in-memory engine, so a file that validates here will also create
//! cleanly at run time.

use std::sync::Arc;

use conduct_core::{Engine, EngineConfig, HandlerRegistry, WorkflowDefinition};

use crate::sim::SimulateHandler;

pub async fn run(file: &str) -> Result<(), String> {
    let definition = WorkflowDefinition::from_file(file).map_err(|e| e.to_string())?;

    let mut registry = HandlerRegistry::new();
    registry
        .register("simulate", Arc::new(SimulateHandler::new()))
        .map_err(|e| e.to_string())?;
    let engine = Engine::start(EngineConfig::default(), registry);
    let controller = engine.controller();

    let result = controller
        .create_workflow_from_definition(&definition)
        .await;
    engine.shutdown();
    result.map_err(|e| e.to_string())?;

    println!("✅ {} is valid", file);
    println!("   workflow: {}", definition.name);
    println!("   agents  : {}", definition.agents.len());
    println!("   tasks   : {}", definition.tasks.len());
    for task in &definition.tasks {
        if task.depends_on.is_empty() {
            println!("   - {} (kind: {})", task.local_id(), task.kind);
        } else {
            println!(
                "   - {} (kind: {}, after: {})",
                task.local_id(),
                task.kind,
                task.depends_on.join(", ")
            );
        }
    }
    Ok(())
}
