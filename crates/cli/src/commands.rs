//! CLI subcommand handlers

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use factory::{choose_capability, EventType, Factory, Plan, Requirements};
use tokio::sync::broadcast::error::RecvError;

use crate::output::OutputHandler;

/// Execute a plan file, printing events as they are published.
/// Returns whether the workflow succeeded.
pub async fn run(factory: &Factory, plan_path: &Path, verbose: bool) -> Result<bool> {
    let output = OutputHandler::new(verbose);
    let plan = Plan::load(plan_path)
        .with_context(|| format!("Failed to read plan {}", plan_path.display()))?;

    output.print_header(&format!(
        "Running '{}' ({} tasks)",
        plan.project_name,
        plan.tasks.len()
    ));

    let mut events = factory.events.subscribe();
    let execution = factory.engine.execute_plan(plan);
    tokio::pin!(execution);

    let outcome = loop {
        tokio::select! {
            result = &mut execution => break result.context("Workflow aborted")?,
            received = events.recv() => match received {
                Ok(event) => output.print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    output.print_warning(&format!("{} events skipped", skipped));
                }
                Err(RecvError::Closed) => {}
            },
        }
    };
    while let Ok(event) = events.try_recv() {
        output.print_event(&event);
    }

    output.print_outcome(&outcome);
    Ok(outcome.is_success())
}

/// Print one workflow document
pub async fn status(factory: &Factory, workflow_id: &str) -> Result<()> {
    let output = OutputHandler::new(false);
    let state = factory
        .store
        .get(workflow_id)
        .await?
        .ok_or_else(|| anyhow!("Workflow not found: {}", workflow_id))?;

    output.print_workflow(&state);
    Ok(())
}

/// List all workflows
pub async fn list(factory: &Factory) -> Result<()> {
    let output = OutputHandler::new(false);
    output.print_header("Workflows");

    let workflows = factory.store.list_workflows().await?;
    if workflows.is_empty() {
        output.print_info("No workflows found.");
        return Ok(());
    }

    output.print_workflows_table(&workflows);
    Ok(())
}

/// Print the event log of a workflow, optionally filtered by type
pub async fn history(
    factory: &Factory,
    workflow_id: &str,
    event_type: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let output = OutputHandler::new(verbose);
    let filter = event_type
        .map(|raw| raw.parse::<EventType>().map_err(|e| anyhow!(e)))
        .transpose()?;

    output.print_header(&format!(
        "Events for {}{}",
        workflow_id,
        filter.as_ref().map(|t| format!(" ({})", t)).unwrap_or_default()
    ));

    let events = factory.events.get_history(workflow_id, filter).await?;
    if events.is_empty() {
        output.print_info("No events found.");
        return Ok(());
    }
    for event in &events {
        output.print_event(event);
    }
    Ok(())
}

/// Print the capability class the selection policy picks
pub fn choose(language: &str, ui: bool, offline: bool, sensitive: bool) {
    let requirements = Requirements {
        language: language.to_string(),
        requires_ui_feedback: ui,
        requires_offline: offline,
        is_data_sensitive: sensitive,
    };
    println!("{}", choose_capability(&requirements));
}
