//! Query progress reporting on stderr.
//!
//! A decomposed question makes several model calls in a row; these
//! reporters show which step is running. Progress goes to **stderr** so
//! stdout stays parseable (`rag ask --json`).

use rulebook_rag_core::progress::{NoProgress, ProgressReporter, QueryProgressEvent};
use std::io::{IsTerminal, Write};

/// Human-friendly progress: "answering 2/3: What is grappled?".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: QueryProgressEvent) {
        let line = format!("{}\n", human_line(&event));
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

fn human_line(event: &QueryProgressEvent) -> String {
    match event {
        QueryProgressEvent::Decomposing => "decomposing question...".to_string(),
        QueryProgressEvent::Planned { count } => format!("planned {} sub-question(s)", count),
        QueryProgressEvent::AnsweringSubQuestion {
            index,
            total,
            question,
        } => format!("answering {}/{}: {}", index, total, question),
        QueryProgressEvent::RetrievingOriginal => {
            "retrieving context for the original question...".to_string()
        }
        QueryProgressEvent::Synthesizing => "synthesizing final answer...".to_string(),
        QueryProgressEvent::FallbackToDirect => {
            "question is already simple; answering directly".to_string()
        }
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: QueryProgressEvent) {
        let mut obj = serde_json::json!({
            "event": "progress",
            "phase": event.phase(),
        });
        match &event {
            QueryProgressEvent::Planned { count } => {
                obj["count"] = serde_json::json!(count);
            }
            QueryProgressEvent::AnsweringSubQuestion {
                index,
                total,
                question,
            } => {
                obj["n"] = serde_json::json!(index);
                obj["total"] = serde_json::json!(total);
                obj["question"] = serde_json::json!(question);
            }
            _ => {}
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_lines() {
        assert_eq!(
            human_line(&QueryProgressEvent::AnsweringSubQuestion {
                index: 2,
                total: 3,
                question: "What is grappled?".to_string()
            }),
            "answering 2/3: What is grappled?"
        );
        assert_eq!(
            human_line(&QueryProgressEvent::Planned { count: 3 }),
            "planned 3 sub-question(s)"
        );
    }
}
