//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the storage ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use sugoroku_core::domain::{
    BoardPosition, MessageEntry, NewNote, NewTeacher, Note, ProgressRecord, SearchLogEntry,
    TeacherProfile,
};
use sugoroku_core::ports::{
    ActivityLog, NoteBook, PortError, PortResult, ProgressStore, TeacherDirectory,
};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a `sqlx` error onto the port taxonomy.
fn port_error(e: sqlx::Error, what: impl Into<String>) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what.into()),
        sqlx::Error::PoolTimedOut => PortError::Timeout(what.into()),
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            PortError::AlreadyExists(what.into())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

/// Escapes LIKE wildcards so a theme is matched literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProgressRow {
    user_id: String,
    theme: String,
    current_position: i32,
    finished: bool,
    started_at: DateTime<Utc>,
}
impl ProgressRow {
    fn to_domain(self) -> ProgressRecord {
        ProgressRecord {
            user_id: self.user_id,
            theme: self.theme,
            current_position: BoardPosition::clamped(self.current_position as i64),
            finished: self.finished,
            started_at: self.started_at,
        }
    }
}

#[derive(FromRow)]
struct TeacherRow {
    id: Uuid,
    name: String,
    shop_name: String,
    specialty: String,
    location: String,
    profile_img_url: Option<String>,
    visit_type: String,
    created_at: DateTime<Utc>,
}
impl TeacherRow {
    fn to_domain(self) -> TeacherProfile {
        TeacherProfile {
            id: self.id,
            name: self.name,
            shop_name: self.shop_name,
            specialty: self.specialty,
            location: self.location,
            profile_img_url: self.profile_img_url,
            visit_type: self.visit_type,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct NoteRow {
    id: Uuid,
    user_id: String,
    entry_title: String,
    summary: String,
    knowledge_card: Vec<String>,
    shop_visit_log: Option<String>,
    created_at: DateTime<Utc>,
}
impl NoteRow {
    fn to_domain(self) -> Note {
        Note {
            id: self.id,
            user_id: self.user_id,
            entry_title: self.entry_title,
            summary: self.summary,
            knowledge_cards: self.knowledge_card,
            shop_visit_log: self.shop_visit_log,
            created_at: self.created_at,
        }
    }
}

const PROGRESS_COLUMNS: &str = "user_id, theme, current_position, finished, started_at";
const TEACHER_COLUMNS: &str =
    "id, name, shop_name, specialty, location, profile_img_url, visit_type, created_at";
const NOTE_COLUMNS: &str =
    "id, user_id, entry_title, summary, knowledge_card, shop_visit_log, created_at";

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn get(&self, user_id: &str, theme: &str) -> PortResult<ProgressRecord> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM sugoroku_progress WHERE user_id = $1 AND theme = $2"
        );
        let record = sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(user_id)
            .bind(theme)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| port_error(e, format!("Progress for {} / {} not found", user_id, theme)))?;
        Ok(record.to_domain())
    }

    async fn create(
        &self,
        user_id: &str,
        theme: &str,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<ProgressRecord> {
        let sql = format!(
            "INSERT INTO sugoroku_progress (id, user_id, theme, current_position, finished) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PROGRESS_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(theme)
            .bind(i32::from(position))
            .bind(finished)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                port_error(e, format!("Progress for {} / {} already exists", user_id, theme))
            })?;
        Ok(record.to_domain())
    }

    async fn update(
        &self,
        user_id: &str,
        theme: &str,
        position: BoardPosition,
        finished: bool,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE sugoroku_progress SET current_position = $1, finished = $2 \
             WHERE user_id = $3 AND theme = $4",
        )
        .bind(i32::from(position))
        .bind(finished)
        .bind(user_id)
        .bind(theme)
        .execute(&self.pool)
        .await
        .map_err(|e| port_error(e, format!("Updating progress for {} / {}", user_id, theme)))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Progress for {} / {} not found",
                user_id, theme
            )));
        }
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
        let result = sqlx::query(
            "UPDATE sugoroku_progress SET current_position = $1, finished = $2 \
             WHERE user_id = $3 AND theme = $4 AND current_position = $5",
        )
        .bind(i32::from(position))
        .bind(finished)
        .bind(user_id)
        .bind(theme)
        .bind(i32::from(expected))
        .execute(&self.pool)
        .await
        .map_err(|e| port_error(e, format!("Updating progress for {} / {}", user_id, theme)))?;

        Ok(result.rows_affected() == 1)
    }
}

//=========================================================================================
// `TeacherDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl TeacherDirectory for DbAdapter {
    async fn register_teacher(&self, teacher: NewTeacher) -> PortResult<TeacherProfile> {
        let sql = format!(
            "INSERT INTO teachers (id, name, shop_name, specialty, location, profile_img_url, visit_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TEACHER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, TeacherRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&teacher.name)
            .bind(&teacher.shop_name)
            .bind(&teacher.specialty)
            .bind(&teacher.location)
            .bind(&teacher.profile_img_url)
            .bind(&teacher.visit_type)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn find_teacher_for_theme(&self, theme: &str) -> PortResult<Option<TeacherProfile>> {
        let sql = format!(
            "SELECT {TEACHER_COLUMNS} FROM teachers \
             WHERE specialty ILIKE '%' || $1 || '%' \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        );
        let record = sqlx::query_as::<_, TeacherRow>(&sql)
            .bind(escape_like(theme))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| port_error(e, format!("Looking up a teacher for {}", theme)))?;
        Ok(record.map(TeacherRow::to_domain))
    }
}

//=========================================================================================
// `ActivityLog` Trait Implementation
//=========================================================================================

#[async_trait]
impl ActivityLog for DbAdapter {
    async fn save_search_log(&self, entry: SearchLogEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO search_logs (id, user_id, query, result_summary) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(&entry.user_id)
        .bind(&entry.query)
        .bind(&entry.result_summary)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn save_message(&self, entry: MessageEntry) -> PortResult<()> {
        sqlx::query("INSERT INTO messages (id, user_id, message, answer) VALUES ($1, $2, $3, $4)")
            .bind(Uuid::new_v4())
            .bind(&entry.user_id)
            .bind(&entry.message)
            .bind(&entry.answer)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

//=========================================================================================
// `NoteBook` Trait Implementation
//=========================================================================================

#[async_trait]
impl NoteBook for DbAdapter {
    async fn save_note(&self, note: NewNote) -> PortResult<Note> {
        let sql = format!(
            "INSERT INTO mynotes (id, user_id, entry_title, summary, knowledge_card, shop_visit_log) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {NOTE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, NoteRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&note.user_id)
            .bind(&note.entry_title)
            .bind(&note.summary)
            .bind(&note.knowledge_cards)
            .bind(&note.shop_visit_log)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn get_notes_for_user(&self, user_id: &str) -> PortResult<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM mynotes WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, NoteRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let notes = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_pure"), "100\\%\\_pure");
        assert_eq!(escape_like("パン作り"), "パン作り");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = port_error(sqlx::Error::RowNotFound, "missing");
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        let err = port_error(sqlx::Error::PoolTimedOut, "slow");
        assert!(matches!(err, PortError::Timeout(_)));
    }
}
