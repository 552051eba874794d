//! Query orchestration.
//!
//! Two flows share the same building blocks (retrieval, context
//! formatting, one completion call per answer):
//!
//! - **Direct**: retrieve for the question, answer from that context.
//! - **Decompose**: ask the model for a numbered list of simpler
//!   sub-questions, answer them in order (each prompt carries every earlier
//!   answer), retrieve for the original question, then synthesize.
//!
//! Every step awaits the previous one. Sub-question `n` needs the answers
//! of `1..n`, so nothing here runs in parallel.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::completion::{Completion, Prompt};
use crate::context::{build_context, dedup_sources};
use crate::error::RagError;
use crate::index::Retriever;
use crate::models::{SourceCitation, SubQuestionRecord};
use crate::progress::{NoProgress, ProgressReporter, QueryProgressEvent};

/// Which flow answers a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Direct,
    Decompose,
}

/// Final answer with its supporting sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Citations deduplicated by `(file, page)`, first occurrence first.
    pub sources: Vec<SourceCitation>,
    /// Answered sub-questions; empty for the direct flow.
    pub sub_questions: Vec<SubQuestionRecord>,
    /// `true` when the decomposition flow ran to synthesis.
    pub decomposed: bool,
}

/// Answers questions against a [`Retriever`] using a [`Completion`] backend.
pub struct QueryOrchestrator<'a, R: ?Sized, C: ?Sized> {
    retriever: &'a R,
    completion: &'a C,
    k: usize,
    progress: &'a dyn ProgressReporter,
}

impl<'a, R, C> QueryOrchestrator<'a, R, C>
where
    R: Retriever + ?Sized,
    C: Completion + ?Sized,
{
    pub fn new(retriever: &'a R, completion: &'a C, k: usize) -> Self {
        Self {
            retriever,
            completion,
            k,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub async fn answer(&self, question: &str, mode: QueryMode) -> Result<QueryAnswer> {
        match mode {
            QueryMode::Direct => self.direct(question).await,
            QueryMode::Decompose => self.decompose(question).await,
        }
    }

    /// One retrieval and one `answer` completion.
    pub async fn direct(&self, question: &str) -> Result<QueryAnswer> {
        let chunks = self.retriever.retrieve(question, self.k).await?;
        let (context, sources) = build_context(&chunks);
        let answer = self
            .complete(Prompt::Answer {
                context: &context,
                question,
            })
            .await?;

        Ok(QueryAnswer {
            answer,
            sources,
            sub_questions: Vec::new(),
            decomposed: false,
        })
    }

    /// Decompose, answer sub-questions in order, then synthesize.
    pub async fn decompose(&self, question: &str) -> Result<QueryAnswer> {
        self.progress.report(QueryProgressEvent::Decomposing);
        let raw = self.complete(Prompt::Decompose { question }).await?;
        let sub_questions = parse_sub_questions(&raw);
        debug!(count = sub_questions.len(), "decomposition planned");

        if is_trivial_plan(&sub_questions, question) {
            debug!("decomposition returned the question itself; answering directly");
            self.progress.report(QueryProgressEvent::FallbackToDirect);
            return self.direct(question).await;
        }
        self.progress.report(QueryProgressEvent::Planned {
            count: sub_questions.len(),
        });

        let total = sub_questions.len();
        let mut records: Vec<SubQuestionRecord> = Vec::with_capacity(total);
        let mut all_sources: Vec<SourceCitation> = Vec::new();

        for (i, sub_question) in sub_questions.into_iter().enumerate() {
            self.progress.report(QueryProgressEvent::AnsweringSubQuestion {
                index: i + 1,
                total,
                question: sub_question.clone(),
            });
            debug!(step = i + 1, total, question = %sub_question, "answering sub-question");

            let chunks = self.retriever.retrieve(&sub_question, self.k).await?;
            let (context, sources) = build_context(&chunks);
            let extended = format!("{}{}", context, history(&records));

            let answer = self
                .complete(Prompt::Answer {
                    context: &extended,
                    question: &sub_question,
                })
                .await?;

            records.push(SubQuestionRecord {
                question: sub_question,
                answer,
            });
            all_sources.extend(sources);
        }

        self.progress.report(QueryProgressEvent::RetrievingOriginal);
        let chunks = self.retriever.retrieve(question, self.k).await?;
        let (original_context, original_sources) = build_context(&chunks);
        all_sources.extend(original_sources);

        self.progress.report(QueryProgressEvent::Synthesizing);
        debug!("synthesizing final answer");
        let sub_question_context = accumulated(&records);
        let answer = self
            .complete(Prompt::Synthesize {
                original_question: question,
                sub_question_context: &sub_question_context,
                context: &original_context,
            })
            .await?;

        Ok(QueryAnswer {
            answer,
            sources: dedup_sources(all_sources),
            sub_questions: records,
            decomposed: true,
        })
    }

    async fn complete(&self, prompt: Prompt<'_>) -> Result<String> {
        self.completion.complete(&prompt).await.map_err(|e| {
            RagError::Completion(format!("{} prompt: {:#}", prompt.template().as_str(), e)).into()
        })
    }
}

/// Extract sub-questions from the model's decomposition output.
///
/// Lines of the form `<digits>. <text>` are taken in order; surrounding
/// whitespace is ignored. When no line is numbered the whole trimmed text
/// is a single sub-question. Blank output yields nothing.
pub fn parse_sub_questions(text: &str) -> Vec<String> {
    let numbered: Vec<String> = text
        .lines()
        .filter_map(|line| numbered_item(line.trim()))
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect();

    if !numbered.is_empty() {
        return numbered;
    }

    let whole = text.trim();
    if whole.is_empty() {
        Vec::new()
    } else {
        vec![whole.to_string()]
    }
}

fn numbered_item(line: &str) -> Option<&str> {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix('.').map(str::trim)
}

/// A plan is trivial when it is empty or is just the original question.
fn is_trivial_plan(sub_questions: &[String], question: &str) -> bool {
    match sub_questions {
        [] => true,
        [only] => normalize(only) == normalize(question),
        _ => false,
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Earlier sub-answers appended to a sub-question's context.
fn history(records: &[SubQuestionRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\nPREVIOUS SUB-QUESTIONS:\n");
    for r in records {
        out.push_str(&format!("Question: {}\nAnswer: {}\n\n", r.question, r.answer));
    }
    out
}

fn accumulated(records: &[SubQuestionRecord]) -> String {
    records
        .iter()
        .map(|r| format!("Sub-question: {}\nAnswer: {}\n\n", r.question, r.answer))
        .collect()
}
