//! Terminal rendering of build events.

use br_protocol::build_models::{BuildRecord, BuildResult, LogStream};
use br_protocol::ipc::BuildEvent;
use colored::{ColoredString, Colorize};
use std::io::Write;
use tokio::sync::mpsc;

/// Colors a result the way the summary line shows it.
pub fn paint_result(result: BuildResult) -> ColoredString {
    let text = result.describe();
    match result {
        BuildResult::Success => text.green(),
        BuildResult::Warnings | BuildResult::Skipped => text.yellow(),
        BuildResult::Failure => text.red(),
        BuildResult::Exception | BuildResult::Retry => text.magenta(),
    }
}

/// Prints events until the channel closes.
///
/// With `json`, each event is written as one JSON document per line.
pub async fn print_events(mut events: mpsc::Receiver<BuildEvent>, json: bool) {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = writeln!(stdout, "{line}");
            }
            continue;
        }

        let _ = match event {
            BuildEvent::BuildStarted {
                builder_name,
                number,
                ..
            } => writeln!(stdout, "{} {builder_name} #{number}", "build".bold()),
            BuildEvent::StepStarted {
                step_name,
                step_index,
                ..
            } => writeln!(stdout, "{} [{step_index}] {}", "step".cyan(), step_name.bold()),
            BuildEvent::StepLogChunk {
                stream, content, ..
            } => match stream {
                LogStream::Stdout => write!(stdout, "{content}"),
                LogStream::Stderr => write!(stdout, "{}", content.red()),
                LogStream::Header => write!(stdout, "{}", content.dimmed()),
            },
            BuildEvent::PropertySet {
                name,
                value,
                source,
                ..
            } => writeln!(stdout, "  {name} = {value} ({source})"),
            BuildEvent::StepFinished {
                step_name, result, ..
            } => writeln!(stdout, "{} {step_name}: {}", "step".cyan(), paint_result(result)),
            BuildEvent::BuildFinished { .. } => Ok(()),
        };
        let _ = stdout.flush();
    }
}

/// One-line summary of a finished build.
pub fn summary(record: &BuildRecord) -> String {
    format!(
        "{} #{}: {} ({})",
        record.builder_name,
        record.number,
        paint_result(record.result),
        record.text.join(" ")
    )
}
