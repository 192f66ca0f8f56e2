//! CLI output formatting

use crate::core::{BootConfig, ExecutionStatus, StepOutput};
use crate::execution::ExecutionEvent;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn format_step_output(output: &StepOutput) -> String {
    match output {
        StepOutput::Done => String::new(),
        StepOutput::Builds(report) if report.failed() > 0 => {
            format!(" ({})", style(output).yellow())
        }
        other => format!(" ({})", style(other).dim()),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::RouteEntered { route, phase } => format!(
            "{} {} [{}]",
            INFO,
            style(route).bold(),
            style(phase).dim()
        ),
        ExecutionEvent::StepStarted { step } => format!("{} {}", SPINNER, style(step).cyan()),
        ExecutionEvent::StepCompleted { step, output } => format!(
            "{} {}{}",
            CHECK,
            style(step).green(),
            format_step_output(output)
        ),
        ExecutionEvent::StepRecovered { step, error } => {
            format!("{} {}: {}", WARN, style(step).yellow(), style(error).dim())
        }
        ExecutionEvent::StepFailed { step, error } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        ExecutionEvent::Rerouted { from_step, to_route } => format!(
            "{} {} → {}",
            INFO,
            style(from_step).dim(),
            style(to_route).cyan()
        ),
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!(
                "{} Boot ({}) {}",
                INFO,
                style(&execution_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Human-readable summary of a resolved configuration
pub fn format_config(config: &BootConfig) -> String {
    let mut lines = vec![
        format!("  Store: {}", style(&config.etcd_url).cyan()),
        format!("  Base path: {}", style(&config.etcd_path).bold()),
        format!("  TTL: {}s", config.etcd_ttl.as_secs()),
    ];
    if config.external_port.is_empty() {
        lines.push(format!("  Heartbeat: {}", style("disabled").dim()));
    } else {
        lines.push(format!(
            "  Heartbeat: {}:{} every {:?}",
            config.host,
            config.external_port,
            config.heartbeat_interval()
        ));
    }
    lines.push(format!("  Directories: {}", style(config.directories.len()).cyan()));
    for dir in &config.directories {
        lines.push(format!("    {}", style(dir).dim()));
    }
    lines.push(format!("  Images: {}", style(config.options.images.len()).cyan()));
    lines.join("\n")
}
