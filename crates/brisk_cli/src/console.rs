//! Human-readable progress on stderr.

use brisk_common::{BuildEvent, EventSink};

/// Prints one line per finished rule and a summary when the build ends.
#[derive(Debug, Default)]
pub struct ConsoleEventSink;

impl EventSink for ConsoleEventSink {
    fn post(&self, event: BuildEvent) {
        if let Some(line) = render(&event) {
            eprintln!("{line}");
        }
    }
}

/// The line printed for `event`, if any.
pub fn render(event: &BuildEvent) -> Option<String> {
    match event {
        BuildEvent::RuleFinished { target, status, .. } => {
            Some(format!("{:>28} {target}", status))
        }
        BuildEvent::BuildFinished {
            exit_code, elapsed, ..
        } => {
            let verdict = if *exit_code == 0 { "Finished" } else { "Failed" };
            Some(format!("{verdict:>28} in {:.2}s", elapsed.as_secs_f64()))
        }
        _ => None,
    }
}
