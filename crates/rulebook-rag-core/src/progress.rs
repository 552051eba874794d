//! Query progress events.
//!
//! A decomposed query makes several sequential model calls, so the
//! orchestrator reports which phase it is in. Front ends decide how to
//! render the events (the CLI writes them to stderr).

/// A single progress event emitted while answering a question.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryProgressEvent {
    /// Asking the model to break the question down.
    Decomposing,
    /// Decomposition produced `count` sub-questions.
    Planned { count: usize },
    /// Answering sub-question `index` (1-based) of `total`.
    AnsweringSubQuestion {
        index: usize,
        total: usize,
        question: String,
    },
    /// Retrieving context for the original question.
    RetrievingOriginal,
    /// Combining the sub-answers into the final answer.
    Synthesizing,
    /// Decomposition returned the question unchanged; answering directly.
    FallbackToDirect,
}

impl QueryProgressEvent {
    /// Short phase name used in machine-readable output.
    pub fn phase(&self) -> &'static str {
        match self {
            QueryProgressEvent::Decomposing => "decomposing",
            QueryProgressEvent::Planned { .. } => "planned",
            QueryProgressEvent::AnsweringSubQuestion { .. } => "answering",
            QueryProgressEvent::RetrievingOriginal => "retrieving_original",
            QueryProgressEvent::Synthesizing => "synthesizing",
            QueryProgressEvent::FallbackToDirect => "fallback_direct",
        }
    }
}

/// Receives progress events from the orchestrator.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: QueryProgressEvent);
}

/// Discards every event.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: QueryProgressEvent) {}
}
