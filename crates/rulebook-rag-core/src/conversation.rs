//! Conversation state for the chat front end.
//!
//! A chat session is an explicit value: each turn takes the previous
//! state and a question and produces the next state plus the answer.
//! The state serializes to JSON so sessions can be saved between runs.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::completion::Completion;
use crate::index::Retriever;
use crate::models::SourceCitation;
use crate::query::{QueryAnswer, QueryMode, QueryOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Citations for assistant messages; always empty for user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceCitation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Return a new state with one question/answer exchange appended.
    pub fn with_exchange(&self, question: &str, answer: &QueryAnswer) -> Self {
        let mut next = self.clone();
        next.messages.push(Message {
            role: Role::User,
            content: question.to_string(),
            sources: Vec::new(),
        });
        next.messages.push(Message {
            role: Role::Assistant,
            content: answer.answer.clone(),
            sources: answer.sources.clone(),
        });
        next
    }
}

/// Answer `question` and return the advanced conversation with the answer.
///
/// The input state is left untouched; on failure no exchange is recorded.
pub async fn respond<R, C>(
    state: &Conversation,
    question: &str,
    mode: QueryMode,
    orchestrator: &QueryOrchestrator<'_, R, C>,
) -> Result<(Conversation, QueryAnswer)>
where
    R: Retriever + ?Sized,
    C: Completion + ?Sized,
{
    let answer = orchestrator.answer(question, mode).await?;
    let next = state.with_exchange(question, &answer);
    Ok((next, answer))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::bail;
    use async_trait::async_trait;

    use super::*;
    use crate::completion::Prompt;
    use crate::embedding::HashingEmbedder;
    use crate::index::memory::InMemoryIndex;
    use crate::models::Chunk;

    struct EchoCompletion;

    #[async_trait]
    impl Completion for EchoCompletion {
        async fn complete(&self, prompt: &Prompt<'_>) -> Result<String> {
            match prompt {
                Prompt::Answer { question, .. } => Ok(format!("re: {}", question)),
                _ => bail!("unexpected prompt"),
            }
        }
    }

    async fn index() -> InMemoryIndex {
        InMemoryIndex::build(
            Arc::new(HashingEmbedder::new(64)),
            &[Chunk::new(
                "Fireball deals 8d6 fire damage.".to_string(),
                "phb.md",
                241,
                "Spells > Fireball".to_string(),
            )],
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_respond_appends_exchange_without_mutating_input() {
        let index = index().await;
        let orchestrator = QueryOrchestrator::new(&index, &EchoCompletion, 4);
        let start = Conversation::new();

        let (next, answer) = respond(&start, "fireball damage?", QueryMode::Direct, &orchestrator)
            .await
            .unwrap();

        assert!(start.is_empty());
        assert_eq!(next.len(), 2);
        assert_eq!(next.messages[0].role, Role::User);
        assert_eq!(next.messages[1].content, answer.answer);
        assert_eq!(next.messages[1].sources[0].page_number, 241);
    }

    #[tokio::test]
    async fn test_failed_turn_records_nothing() {
        let index = index().await;
        let orchestrator = QueryOrchestrator::new(&index, &EchoCompletion, 4);
        let start = Conversation::new();

        // EchoCompletion rejects decomposition prompts.
        let result = respond(&start, "anything", QueryMode::Decompose, &orchestrator).await;
        assert!(result.is_err());
        assert!(start.is_empty());
    }

    #[test]
    fn test_user_messages_serialize_without_sources() {
        let conv = Conversation::new().with_exchange(
            "q",
            &QueryAnswer {
                answer: "a".to_string(),
                sources: Vec::new(),
                sub_questions: Vec::new(),
                decomposed: false,
            },
        );
        let json = serde_json::to_string(&conv).unwrap();
        assert_eq!(
            json,
            r#"{"messages":[{"role":"user","content":"q"},{"role":"assistant","content":"a"}]}"#
        );
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
    }
}
