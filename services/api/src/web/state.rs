//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::error::ApiError;
use std::sync::Arc;
use sugoroku_core::ports::{
    ActivityLog, CompletionStreamService, NoteBook, ProgressStore, QuizSynthesisService,
    TeacherDirectory,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// Everything backed by the relational store.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressStore>,
    pub teachers: Arc<dyn TeacherDirectory>,
    pub activity: Arc<dyn ActivityLog>,
    pub notes: Arc<dyn NoteBook>,
}

impl Storage {
    /// Uses one adapter for every storage port.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ProgressStore + TeacherDirectory + ActivityLog + NoteBook + 'static,
    {
        Self {
            progress: store.clone(),
            teachers: store.clone(),
            activity: store.clone(),
            notes: store,
        }
    }
}

/// Everything backed by the language-model API.
#[derive(Clone)]
pub struct Models {
    pub answers: Arc<dyn CompletionStreamService>,
    pub quizzes: Arc<dyn QuizSynthesisService>,
}

/// The shared application state, created once at startup and passed to all handlers.
///
/// Handlers keep no other state between requests; everything shared lives
/// behind the storage ports.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when no store URL was configured.
    pub storage: Option<Storage>,
    /// `None` when no model credential was configured.
    pub models: Option<Models>,
}

impl AppState {
    pub fn storage(&self) -> Result<&Storage, ApiError> {
        self.storage
            .as_ref()
            .ok_or_else(|| ApiError::Configuration("Database configuration error".to_string()))
    }

    pub fn models(&self) -> Result<&Models, ApiError> {
        self.models
            .as_ref()
            .ok_or_else(|| ApiError::Configuration("OPENAI_API_KEY is not configured".to_string()))
    }
}
