//! Personality evolution and memory consolidation for a local conversational assistant.
//!
//! Psyche keeps a small vector of personality traits in SQLite and lets it drift
//! through accumulated interaction rather than direct edits:
//!
//! | Stage | When | Effect |
//! |-------|------|--------|
//! | **Scoring** | Every turn | Importance and emotional weight, from a versioned weight table |
//! | **Live nudges** | Every turn | Small clamped trait deltas, passive decay toward baseline |
//! | **Consolidation** | Nightly | One capped net delta per trait, knowledge summaries, snapshot |
//! | **Goals** | Both | Monotonic progress, single completion, successor goal |
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) with an append-only trait history and one audit
//!   record per consolidation date
//! - **Scheduling**: a tokio interval loop that claims tonight's slot with an
//!   atomic insert-if-absent before doing any work
//! - **Generation**: a local Ollama model behind the `TextGenerator` trait,
//!   with a bounded timeout per call
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`error`]: Typed validation and generation errors
//! - [`evolution`]: Trait store, scorer, turn ingest, consolidation, scheduler, goals
//! - [`generation`]: Text-generation dependency used for knowledge summaries

pub mod config;
pub mod db;
pub mod error;
pub mod evolution;
pub mod generation;
