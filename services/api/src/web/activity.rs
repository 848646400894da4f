//! services/api/src/web/activity.rs
//!
//! "Fire-and-forget" background tasks that record what children asked.
//! Their failures are logged and never reach the response.

use std::sync::Arc;
use sugoroku_core::domain::{MessageEntry, QuizSpec, SearchLogEntry};
use sugoroku_core::ports::ActivityLog;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Summary stored when the streamed answer produced no text at all.
const EMPTY_ANSWER_SUMMARY: &str = "AI response";

/// Records one chat turn: a search-history row and a transcript row.
pub fn spawn_conversation_log(
    activity: Arc<dyn ActivityLog>,
    user_id: String,
    query: String,
    answer: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let summary = match answer.trim() {
            "" => EMPTY_ANSWER_SUMMARY.to_string(),
            trimmed => trimmed.to_string(),
        };

        let search = SearchLogEntry {
            user_id: user_id.clone(),
            query: query.clone(),
            result_summary: summary,
        };
        if let Err(e) = activity.save_search_log(search).await {
            error!("Error saving search log for user {}: {}", user_id, e);
            return;
        }

        let message = MessageEntry {
            user_id: user_id.clone(),
            message: query,
            answer,
        };
        match activity.save_message(message).await {
            Ok(()) => info!("Saved chat turn for user {}", user_id),
            Err(e) => error!("Error saving message for user {}: {}", user_id, e),
        }
    })
}

/// Records that a quiz was generated for a topic.
pub fn spawn_quiz_log(
    activity: Arc<dyn ActivityLog>,
    user_id: String,
    topic: String,
    quiz: &QuizSpec,
) -> JoinHandle<()> {
    let entry = SearchLogEntry {
        user_id,
        query: format!("クイズ生成: {}", topic),
        result_summary: format!("クイズ: {}", quiz.question),
    };
    tokio::spawn(async move {
        let user_id = entry.user_id.clone();
        if let Err(e) = activity.save_search_log(entry).await {
            error!("Error saving quiz log for user {}: {}", user_id, e);
        }
    })
}
