//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the storage ports. It mirrors the Postgres
//! adapter's semantics (unique (user, theme) key, registration-order teacher
//! matching, newest-first notes) and backs the test suite.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use sugoroku_core::domain::{
    BoardPosition, MessageEntry, NewNote, NewTeacher, Note, ProgressRecord, SearchLogEntry,
    TeacherProfile,
};
use sugoroku_core::ports::{
    ActivityLog, NoteBook, PortError, PortResult, ProgressStore, TeacherDirectory,
};
use tokio::sync::RwLock;
use uuid::Uuid;

type ProgressKey = (String, String);

fn key(user_id: &str, theme: &str) -> ProgressKey {
    (user_id.to_string(), theme.to_string())
}

#[derive(Default)]
pub struct InMemoryStore {
    progress: RwLock<HashMap<ProgressKey, ProgressRecord>>,
    teachers: RwLock<Vec<TeacherProfile>>,
    search_logs: RwLock<Vec<SearchLogEntry>>,
    messages: RwLock<Vec<MessageEntry>>,
    notes: RwLock<Vec<Note>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn progress_count(&self) -> usize {
        self.progress.read().await.len()
    }

    pub async fn search_logs(&self) -> Vec<SearchLogEntry> {
        self.search_logs.read().await.clone()
    }

    pub async fn messages(&self) -> Vec<MessageEntry> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn get(&self, user_id: &str, theme: &str) -> PortResult<ProgressRecord> {
        self.progress
            .read()
            .await
            .get(&key(user_id, theme))
            .cloned()
            .ok_or_else(|| {
                PortError::NotFound(format!("Progress for {} / {} not found", user_id, theme))
            })
    }

    async fn create(
        &self,
        user_id: &str,
        theme: &str,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<ProgressRecord> {
        let mut progress = self.progress.write().await;
        let k = key(user_id, theme);
        if progress.contains_key(&k) {
            return Err(PortError::AlreadyExists(format!(
                "Progress for {} / {} already exists",
                user_id, theme
            )));
        }
        let record = ProgressRecord {
            user_id: user_id.to_string(),
            theme: theme.to_string(),
            current_position: position,
            finished,
            started_at: Utc::now(),
        };
        progress.insert(k, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        user_id: &str,
        theme: &str,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<()> {
        let mut progress = self.progress.write().await;
        let record = progress.get_mut(&key(user_id, theme)).ok_or_else(|| {
            PortError::NotFound(format!("Progress for {} / {} not found", user_id, theme))
        })?;
        record.current_position = position;
        record.finished = finished;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        user_id: &str,
        theme: &str,
        expected: BoardPosition,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<bool> {
        let mut progress = self.progress.write().await;
        match progress.get_mut(&key(user_id, theme)) {
            Some(record) if record.current_position == expected => {
                record.current_position = position;
                record.finished = finished;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TeacherDirectory for InMemoryStore {
    async fn register_teacher(&self, teacher: NewTeacher) -> PortResult<TeacherProfile> {
        let profile = TeacherProfile {
            id: Uuid::new_v4(),
            name: teacher.name,
            shop_name: teacher.shop_name,
            specialty: teacher.specialty,
            location: teacher.location,
            profile_img_url: teacher.profile_img_url,
            visit_type: teacher.visit_type,
            created_at: Utc::now(),
        };
        self.teachers.write().await.push(profile.clone());
        Ok(profile)
    }

    async fn find_teacher_for_theme(&self, theme: &str) -> PortResult<Option<TeacherProfile>> {
        // The vector is in registration order, which is the tie-break.
        Ok(self
            .teachers
            .read()
            .await
            .iter()
            .find(|t| t.teaches(theme))
            .cloned())
    }
}

#[async_trait]
impl ActivityLog for InMemoryStore {
    async fn save_search_log(&self, entry: SearchLogEntry) -> PortResult<()> {
        self.search_logs.write().await.push(entry);
        Ok(())
    }

    async fn save_message(&self, entry: MessageEntry) -> PortResult<()> {
        self.messages.write().await.push(entry);
        Ok(())
    }
}

#[async_trait]
impl NoteBook for InMemoryStore {
    async fn save_note(&self, note: NewNote) -> PortResult<Note> {
        let note = Note {
            id: Uuid::new_v4(),
            user_id: note.user_id,
            entry_title: note.entry_title,
            summary: note.summary,
            knowledge_cards: note.knowledge_cards,
            shop_visit_log: note.shop_visit_log,
            created_at: Utc::now(),
        };
        self.notes.write().await.push(note.clone());
        Ok(note)
    }

    async fn get_notes_for_user(&self, user_id: &str) -> PortResult<Vec<Note>> {
        Ok(self
            .notes
            .read()
            .await
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}
