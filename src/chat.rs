//! `rag ask` and `rag chat`: question answering over the index.

use anyhow::{Context, Result};
use rulebook_rag_core::completion::Completion;
use rulebook_rag_core::conversation::{respond, Conversation};
use rulebook_rag_core::models::SourceCitation;
use rulebook_rag_core::query::{QueryAnswer, QueryMode, QueryOrchestrator};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::warn;

use crate::index_manager::{IndexManager, IndexState};
use crate::progress::ProgressMode;

/// Answer one question and print it with its sources.
pub async fn run_ask(
    manager: &IndexManager,
    completion: &dyn Completion,
    question: &str,
    mode: QueryMode,
    json: bool,
    progress: ProgressMode,
) -> Result<()> {
    require_index(manager)?;
    let reporter = progress.reporter();
    let orchestrator = QueryOrchestrator::new(manager, completion, manager.config().retrieval.k)
        .with_progress(reporter.as_ref());

    let answer = orchestrator.answer(question, mode).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

/// Interactive loop over stdin. With `session`, the conversation is loaded
/// from and saved to that JSON file after every turn.
pub async fn run_chat(
    manager: &IndexManager,
    completion: &dyn Completion,
    mode: QueryMode,
    session: Option<&Path>,
    progress: ProgressMode,
) -> Result<()> {
    require_index(manager)?;
    let reporter = progress.reporter();
    let orchestrator = QueryOrchestrator::new(manager, completion, manager.config().retrieval.k)
        .with_progress(reporter.as_ref());

    let mut state = match session {
        Some(path) => load_session(path)?,
        None => Conversation::new(),
    };
    if !state.is_empty() {
        println!("Resumed session with {} message(s).", state.len());
    }
    println!("Ask about the rulebooks. Type /clear to start over, /exit to quit.");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                state = Conversation::new();
                if let Some(path) = session {
                    save_session(path, &state)?;
                }
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match respond(&state, question, mode, &orchestrator).await {
            Ok((next, answer)) => {
                print_answer(&answer);
                state = next;
                if let Some(path) = session {
                    save_session(path, &state)?;
                }
            }
            // A failed turn leaves the conversation as it was; the user can retry.
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }
    Ok(())
}

fn require_index(manager: &IndexManager) -> Result<()> {
    if manager.state() == IndexState::Absent {
        return Err(rulebook_rag_core::error::RagError::IndexUnavailable.into());
    }
    Ok(())
}

pub fn load_session(path: &Path) -> Result<Conversation> {
    if !path.exists() {
        return Ok(Conversation::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(state) => Ok(state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable session; starting fresh");
            Ok(Conversation::new())
        }
    }
}

pub fn save_session(path: &Path, state: &Conversation) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write session {}", path.display()))
}

fn print_answer(answer: &QueryAnswer) {
    println!();
    println!("{}", answer.answer.trim());
    if answer.decomposed {
        println!();
        println!("Sub-questions:");
        for (i, record) in answer.sub_questions.iter().enumerate() {
            println!("  {}. {}", i + 1, record.question);
        }
    }
    if !answer.sources.is_empty() {
        println!();
        print!("{}", format_sources(&answer.sources));
    }
    println!();
}

/// Render citations as a table: file, page, section, excerpt.
pub fn format_sources(sources: &[SourceCitation]) -> String {
    let mut out = format!("{:<28} {:>5}  {:<32} {}\n", "FILE", "PAGE", "SECTION", "EXCERPT");
    for s in sources {
        let section = if s.section_path.is_empty() {
            "No section"
        } else {
            s.section_path.as_str()
        };
        let excerpt = s.content_excerpt.replace('\n', " ");
        out.push_str(&format!(
            "{:<28} {:>5}  {:<32} {}\n",
            s.file_name, s.page_number, section, excerpt
        ));
    }
    out
}
