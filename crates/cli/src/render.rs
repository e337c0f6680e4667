//! Report rendering for the terminal

use colored::Colorize;
use ykpgp_openpgp::{Report, SelfTest, SessionPhase, StepOutcome, StepResult};

/// Print the report as colored text or JSON
pub(crate) fn print_report(report: &Report, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", "OpenPGP run".bold().underline());
    for step in report.steps() {
        println!("{}", format_step(step));
    }
    println!("{}", format_phase(report.phase()));
    Ok(())
}

fn format_step(step: &StepResult) -> String {
    let mut line = match step.outcome() {
        StepOutcome::Card(outcome) if outcome.is_success() => {
            if step.self_test() == Some(SelfTest::Mismatch) {
                warning(step.message())
            } else {
                success(step.message())
            }
        }
        StepOutcome::Card(_) | StepOutcome::Skipped(_) => warning(step.message()),
        StepOutcome::Failed(_) => failure(step.message()),
    };

    if let Some(payload) = step.payload() {
        line.push_str(&format!("\n  {}: {}", "data".bold(), hex::encode_upper(payload)));
    }
    line
}

fn format_phase(phase: SessionPhase) -> String {
    match phase {
        SessionPhase::Completed => success("Run completed."),
        _ => failure(&format!("Run {phase}.")),
    }
}

fn success(message: &str) -> String {
    format!("✅ {}", message.green().bold())
}

fn warning(message: &str) -> String {
    format!("⚠️  {}", message.yellow().bold())
}

fn failure(message: &str) -> String {
    format!("❌ {}", message.red().bold())
}
