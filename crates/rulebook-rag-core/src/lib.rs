//! # Rulebook RAG Core
//!
//! Shared logic for Rulebook RAG: data models, the markdown document
//! splitter, the vector index and completion capabilities, context
//! formatting, and the query orchestrator.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP
//! dependencies. Storage backends and model clients live in the
//! `rulebook-rag` app crate and plug in through the traits defined here.

pub mod completion;
pub mod context;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod progress;
pub mod query;
pub mod splitter;
