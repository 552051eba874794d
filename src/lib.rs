//! # Rulebook RAG
//!
//! Retrieval-augmented question answering over a folder of markdown
//! rulebooks.
//!
//! Markdown files are split into page- and section-aware chunks, embedded
//! and stored in a SQLite vector index. A content-hash ledger makes
//! re-indexing incremental. Questions are answered either directly (one
//! retrieval, one completion) or by decomposing them into sub-questions
//! that are answered in sequence and then synthesized.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Scanner   │──▶│  Ledger  │──▶│   Splitter   │──▶│  SQLite  │
//! │ *.md files │   │ MD5 diff │   │ pages/headers│   │  index   │
//! └────────────┘   └──────────┘   └──────────────┘   └────┬─────┘
//!                                                         │
//!                       ┌──────────────┐   retrieve       │
//!      question ───────▶│ Orchestrator │◀─────────────────┘
//!                       │ direct/decomp│──▶ Ollama chat
//!                       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag check                      # verify directories and config
//! rag init                       # build or update the index
//! rag ask "How does grappling work?" --mode decompose
//! rag chat --session chat.json   # interactive, resumable
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, defaults, env overrides |
//! | [`scanner`] | Markdown discovery and MD5 fingerprints |
//! | [`ledger`] | Processing ledger (`processed_files.json`) |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`index_manager`] | Index lifecycle and retrieval |
//! | [`embedding`] | Ollama / OpenAI embedders |
//! | [`llm`] | Ollama chat completion |
//! | [`prompts`] | Prompt templates |
//! | [`prerequisites`] | Environment checks |
//! | [`chat`] | `ask` and `chat` commands |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index_manager;
pub mod ledger;
pub mod llm;
pub mod migrate;
pub mod prerequisites;
pub mod progress;
pub mod prompts;
pub mod scanner;
pub mod sqlite_index;
pub mod stats;
