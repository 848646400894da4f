//! crates/sugoroku_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{
    BoardPosition, MessageEntry, NewNote, NewTeacher, Note, ProgressRecord, QuizSpec,
    SearchLogEntry, TeacherProfile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("Upstream call timed out: {0}")]
    Timeout(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The raw body of a streamed chat completion, chunked as it arrives.
pub type CompletionByteStream = Pin<Box<dyn Stream<Item = PortResult<Bytes>> + Send>>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

/// Durable per-(user, theme) board positions.
///
/// `get` followed by `create` is not atomic; a racing `create` reports
/// `PortError::AlreadyExists` and the caller should `get` again.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, user_id: &str, theme: &str) -> PortResult<ProgressRecord>;

    async fn create(
        &self,
        user_id: &str,
        theme: &str,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<ProgressRecord>;

    async fn update(
        &self,
        user_id: &str,
        theme: &str,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<()>;

    /// Writes the new position only if the stored one still equals `expected`.
    /// Returns `false` when the row changed underneath or no longer exists.
    async fn compare_and_set(
        &self,
        user_id: &str,
        theme: &str,
        expected: BoardPosition,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<bool>;
}

#[async_trait]
pub trait TeacherDirectory: Send + Sync {
    async fn register_teacher(&self, teacher: NewTeacher) -> PortResult<TeacherProfile>;

    /// The earliest-registered teacher whose specialty contains `theme`
    /// (case-insensitive), if any.
    async fn find_teacher_for_theme(&self, theme: &str) -> PortResult<Option<TeacherProfile>>;
}

/// Best-effort history of what children asked.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn save_search_log(&self, entry: SearchLogEntry) -> PortResult<()>;

    async fn save_message(&self, entry: MessageEntry) -> PortResult<()>;
}

#[async_trait]
pub trait NoteBook: Send + Sync {
    async fn save_note(&self, note: NewNote) -> PortResult<Note>;

    /// All notes for a user, newest first.
    async fn get_notes_for_user(&self, user_id: &str) -> PortResult<Vec<Note>>;
}

//=========================================================================================
// Model Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CompletionStreamService: Send + Sync {
    /// Starts a streamed, child-friendly answer to `query` and hands back the
    /// raw event-stream body. Errors here happen before any byte is relayed.
    async fn stream_answer(&self, query: &str) -> PortResult<CompletionByteStream>;
}

#[async_trait]
pub trait QuizSynthesisService: Send + Sync {
    /// Generates a quiz about `topic`. An unusable reply yields `QuizSpec::empty()`.
    async fn synthesize(&self, topic: &str) -> PortResult<QuizSpec>;
}
