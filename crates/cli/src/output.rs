//! Output formatting and terminal rendering

use colored::{ColoredString, Colorize};
use factory::{AgentEvent, EventType, ExecutionOutcome, TaskStatus, WorkflowState, WorkflowStatus};

/// One-line summary of an event payload
fn summarize(event: &AgentEvent) -> String {
    event
        .payload_str("message")
        .or_else(|| event.payload_str("error"))
        .map(String::from)
        .unwrap_or_else(|| match event.event_type {
            EventType::AgentStarted => format!(
                "started on {}",
                event.payload_str("capability").unwrap_or("unknown capability")
            ),
            _ => event.payload.to_string(),
        })
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn task_status_colored(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => status.as_str().bright_yellow(),
        TaskStatus::InProgress => status.as_str().bright_blue(),
        TaskStatus::Completed => status.as_str().bright_green(),
        TaskStatus::Failed => status.as_str().bright_red(),
    }
}

fn workflow_status_colored(status: WorkflowStatus) -> ColoredString {
    match status {
        WorkflowStatus::Running => status.as_str().bright_blue(),
        WorkflowStatus::Completed => status.as_str().bright_green(),
        WorkflowStatus::Failed => status.as_str().bright_red(),
    }
}

/// Output handler for terminal display
pub struct OutputHandler {
    /// Print full event payloads
    pub verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Print a section header
    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", format!("▶ {}", text).bright_yellow().bold());
        println!("{}", "─".repeat(60).dimmed());
    }

    pub fn print_success(&self, text: &str) {
        println!("{} {}", "✓".bright_green(), text.bright_white());
    }

    pub fn print_error(&self, text: &str) {
        println!("{} {}", "✗".bright_red(), text.bright_red());
    }

    pub fn print_warning(&self, text: &str) {
        println!("{} {}", "⚠".bright_yellow(), text.yellow());
    }

    pub fn print_info(&self, text: &str) {
        println!("{} {}", "ℹ".bright_blue(), text);
    }

    /// Print one event-log line
    pub fn print_event(&self, event: &AgentEvent) {
        let kind = match event.event_type {
            EventType::AgentStarted => event.event_type.as_str().bright_blue(),
            EventType::AgentCompleted | EventType::WorkflowCompleted => {
                event.event_type.as_str().bright_green()
            }
            EventType::WorkflowFailed => event.event_type.as_str().bright_red(),
            EventType::TaskProgress => match event.payload_str("level") {
                Some("error") => event.event_type.as_str().bright_red(),
                Some("warning") => event.event_type.as_str().yellow(),
                _ => event.event_type.as_str().normal(),
            },
        };

        println!(
            "{} {:<24} {:<18} {}",
            event.created_at.format("%H:%M:%S%.3f").to_string().dimmed(),
            event.source_agent.bright_white(),
            kind,
            summarize(event)
        );
        if self.verbose {
            println!("    {}", event.payload.to_string().dimmed());
        }
    }

    /// Print the result of an engine run
    pub fn print_outcome(&self, outcome: &ExecutionOutcome) {
        self.print_header(&format!("Workflow {}", outcome.workflow_id));
        for result in &outcome.results {
            let line = format!("{} [{}] {}", result.task_id, result.department, result.message);
            if result.is_failed() {
                self.print_error(&line);
            } else {
                self.print_success(&line);
            }
            for artifact in &result.artifacts {
                let first_line = artifact.lines().next().unwrap_or_default();
                println!("    {} {}", "→".dimmed(), first_line.dimmed());
            }
        }

        println!();
        match &outcome.error {
            None => self.print_success(&format!("{} tasks completed", outcome.results.len())),
            Some(error) => self.print_error(&format!("Workflow failed: {}", error)),
        }
    }

    /// Print a workflow document with its tasks
    pub fn print_workflow(&self, state: &WorkflowState) {
        self.print_header(&format!("{} ({})", state.project_name, state.id));
        println!("  {} {}", "Status:".dimmed(), workflow_status_colored(state.status));
        println!("  {} {}", "Started:".dimmed(), state.started_at.to_rfc3339());
        println!("  {} {}", "Updated:".dimmed(), state.updated_at.to_rfc3339());
        if let Some(error) = &state.error {
            println!("  {} {}", "Error:".dimmed(), error.bright_red());
        }

        println!();
        println!(
            "{}",
            format!("{:<12} {:<22} {:>12}  {}", "Task", "Department", "Status", "Description")
                .bright_white()
                .bold()
        );
        println!("{}", "─".repeat(80).dimmed());
        for task in &state.tasks {
            println!(
                "{:<12} {:<22} {:>12}  {}",
                short_id(&task.id).dimmed(),
                task.department,
                task_status_colored(task.status),
                task.description
            );
            if self.verbose && !task.output_data.is_empty() {
                let rendered = serde_json::to_string_pretty(&task.output_data).unwrap_or_default();
                for line in rendered.lines() {
                    println!("    {}", line.dimmed());
                }
            }
        }
        println!();
    }

    /// Print the workflow list
    pub fn print_workflows_table(&self, workflows: &[WorkflowState]) {
        println!();
        println!(
            "{}",
            format!("{:<36} {:<30} {:>10} {:>8}", "ID", "Project", "Status", "Tasks")
                .bright_white()
                .bold()
        );
        println!("{}", "─".repeat(88).dimmed());

        for workflow in workflows {
            let project = if workflow.project_name.chars().count() > 28 {
                let cut: String = workflow.project_name.chars().take(25).collect();
                format!("{}...", cut)
            } else {
                workflow.project_name.clone()
            };
            let done = workflow
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .count();

            println!(
                "{:<36} {:<30} {:>10} {:>8}",
                workflow.id.dimmed(),
                project.bright_white(),
                workflow_status_colored(workflow.status),
                format!("{}/{}", done, workflow.tasks.len())
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_prefers_message_then_error() {
        let done = AgentEvent::new(
            EventType::AgentCompleted,
            "ResearchAgent",
            "w1",
            Some("t1".to_string()),
            json!({"message": "done"}),
        );
        assert_eq!(summarize(&done), "done");

        let failed = AgentEvent::new(
            EventType::WorkflowFailed,
            "Orchestrator",
            "w1",
            None,
            json!({"error": "boom"}),
        );
        assert_eq!(summarize(&failed), "boom");

        let started = AgentEvent::new(
            EventType::AgentStarted,
            "DataAgent",
            "w1",
            Some("t2".to_string()),
            json!({"agent": "DataAgent", "capability": "process-sandbox"}),
        );
        assert_eq!(summarize(&started), "started on process-sandbox");
    }

    #[test]
    fn test_short_id_handles_short_input() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789"), "01234567");
    }
}
