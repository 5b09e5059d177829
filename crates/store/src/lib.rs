//! Storage backends for Helmsman.
//!
//! - [`SqliteStore`]: durable transcripts plus the tool execution audit log
//! - [`InMemoryTranscriptStore`]: ephemeral transcripts for tests and one-off runs
//! - [`SqliteProjectResolver`]: per-project SQLite databases that tools query

pub mod in_memory;
pub mod project;
pub mod sqlite;

pub use in_memory::InMemoryTranscriptStore;
pub use project::{SqliteProjectResolver, SqliteProjectStore, validate_project_id};
pub use sqlite::SqliteStore;
