//! Completion capability.
//!
//! The orchestrator never sees prompt wording. It asks for one of three
//! named templates and supplies that template's variables; the backend
//! renders the template and returns the model's text.

use anyhow::Result;
use async_trait::async_trait;

/// Template identifiers known to every completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    Answer,
    Decompose,
    Synthesize,
}

impl PromptTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTemplate::Answer => "answer",
            PromptTemplate::Decompose => "decompose",
            PromptTemplate::Synthesize => "synthesize",
        }
    }
}

/// A template together with its variable bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt<'a> {
    /// Answer `question` from `context`.
    Answer { context: &'a str, question: &'a str },
    /// Break `question` into a numbered list of simpler questions.
    Decompose { question: &'a str },
    /// Combine sub-question answers and retrieved context into one answer.
    Synthesize {
        original_question: &'a str,
        sub_question_context: &'a str,
        context: &'a str,
    },
}

impl<'a> Prompt<'a> {
    pub fn template(&self) -> PromptTemplate {
        match self {
            Prompt::Answer { .. } => PromptTemplate::Answer,
            Prompt::Decompose { .. } => PromptTemplate::Decompose,
            Prompt::Synthesize { .. } => PromptTemplate::Synthesize,
        }
    }

    /// Variable bindings as `(name, value)` pairs.
    pub fn variables(&self) -> Vec<(&'static str, &'a str)> {
        match *self {
            Prompt::Answer { context, question } => {
                vec![("context", context), ("question", question)]
            }
            Prompt::Decompose { question } => vec![("question", question)],
            Prompt::Synthesize {
                original_question,
                sub_question_context,
                context,
            } => vec![
                ("original_question", original_question),
                ("sub_question_context", sub_question_context),
                ("context", context),
            ],
        }
    }
}

/// A text-generation backend.
///
/// Failures (network errors, timeouts) are returned as-is; callers decide
/// whether to retry the whole query.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &Prompt<'_>) -> Result<String>;
}
