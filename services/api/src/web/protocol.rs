//! services/api/src/web/protocol.rs
//!
//! Defines the JSON message protocol between the browser client and the API server.
//!
//! Request fields are snake_case; the camelCase spellings the browser client
//! sends (`userId`, `isCorrect`, ...) are accepted as aliases. Required fields
//! are modelled as `Option` so a missing field becomes a validation error in
//! the usual `{error}` shape rather than an extractor rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sugoroku_core::domain::{Note, QuizSpec, Reward, TeacherProfile};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Returns the trimmed value when it is present and non-blank.
pub fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//=========================================================================================
// Chat Answers
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct GenerateAnswerRequest {
    pub query: Option<String>,
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

/// One event of the streamed answer, sent as `data: <json>` on the event stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// An incremental piece of the answer text, in arrival order.
    Content { data: String },
}

//=========================================================================================
// Quizzes
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct GenerateQuizRequest {
    pub topic: Option<String>,
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct QuizView {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl From<QuizSpec> for QuizView {
    fn from(quiz: QuizSpec) -> Self {
        Self {
            question: quiz.question,
            options: quiz.options,
            correct_answer: quiz.correct_answer,
        }
    }
}

/// An empty `options` list means no quiz is available for this turn.
#[derive(Serialize, Debug, ToSchema)]
pub struct QuizResponse {
    pub quiz: QuizView,
}

//=========================================================================================
// Board Status
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct StatusRequest {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
    pub theme: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct StatusResponse {
    pub theme: String,
    pub current_position: u8,
    pub finished: bool,
    pub started_at: DateTime<Utc>,
    /// Present when the store failed and the values are the "not yet started" defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//=========================================================================================
// Quiz Answers and Rewards
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct SubmitAnswerRequest {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
    pub theme: Option<String>,
    pub answer: Option<String>,
    #[serde(default, alias = "isCorrect")]
    pub is_correct: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SubmitAnswerResponse {
    pub correct: bool,
    pub new_position: u8,
    pub finished: bool,
    pub reward: Option<RewardPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitAnswerResponse {
    /// The error shape: nothing moved, no reward.
    pub fn failed(message: String) -> Self {
        Self {
            correct: false,
            new_position: 0,
            finished: false,
            reward: None,
            error: Some(message),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RewardPayload {
    pub knowledge_card: String,
    pub teacher: Option<TeacherView>,
}

impl From<Reward> for RewardPayload {
    fn from(reward: Reward) -> Self {
        match reward {
            Reward::WithTeacher {
                knowledge_card,
                teacher,
            } => Self {
                knowledge_card,
                teacher: Some(teacher.into()),
            },
            Reward::WithoutTeacher { knowledge_card } => Self {
                knowledge_card,
                teacher: None,
            },
        }
    }
}

//=========================================================================================
// Teachers
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
pub struct TeacherView {
    pub id: Uuid,
    pub name: String,
    pub shop_name: String,
    pub specialty: String,
    pub location: String,
    pub profile_img_url: Option<String>,
    pub visit_type: String,
}

impl From<TeacherProfile> for TeacherView {
    fn from(teacher: TeacherProfile) -> Self {
        Self {
            id: teacher.id,
            name: teacher.name,
            shop_name: teacher.shop_name,
            specialty: teacher.specialty,
            location: teacher.location,
            profile_img_url: teacher.profile_img_url,
            visit_type: teacher.visit_type,
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterTeacherRequest {
    pub name: Option<String>,
    #[serde(alias = "shopName")]
    pub shop_name: Option<String>,
    pub specialty: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "profileImgUrl")]
    pub profile_img_url: Option<String>,
    #[serde(alias = "visitType")]
    pub visit_type: Option<String>,
}

//=========================================================================================
// My Notes
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateNoteRequest {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
    #[serde(alias = "entryTitle")]
    pub entry_title: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, alias = "knowledgeCard")]
    pub knowledge_card: Vec<String>,
    #[serde(alias = "shopVisitLog")]
    pub shop_visit_log: Option<String>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotesQuery {
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct NoteView {
    pub id: Uuid,
    pub entry_title: String,
    pub summary: String,
    pub knowledge_card: Vec<String>,
    pub shop_visit_log: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Note> for NoteView {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            entry_title: note.entry_title,
            summary: note.summary,
            knowledge_card: note.knowledge_cards,
            shop_visit_log: note.shop_visit_log,
            created_at: note.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct NotesResponse {
    pub notes: Vec<NoteView>,
}
