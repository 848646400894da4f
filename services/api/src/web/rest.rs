//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::{
    activity::{spawn_conversation_log, spawn_quiz_log},
    answer_task::{submit_answer, AnswerEvent},
    protocol::{
        required, CreateNoteRequest, GenerateAnswerRequest, GenerateQuizRequest, NoteView,
        NotesQuery, NotesResponse, QuizResponse, QuizView, RegisterTeacherRequest, RewardPayload,
        StatusRequest, StatusResponse, StreamFrame, SubmitAnswerRequest, SubmitAnswerResponse,
        TeacherView,
    },
    relay::relay_completion,
    state::AppState,
    status_task::get_or_create_status,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
};
use serde_json::json;
use std::sync::Arc;
use sugoroku_core::domain::{NewNote, NewTeacher};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

/// How many relayed frames may wait for a slow client before the relay blocks.
const RELAY_BUFFER: usize = 32;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_answer_handler,
        generate_quiz_handler,
        get_status_handler,
        submit_answer_handler,
        register_teacher_handler,
        create_note_handler,
        list_notes_handler,
    ),
    components(
        schemas(
            GenerateAnswerRequest, StreamFrame, GenerateQuizRequest, QuizResponse, QuizView,
            StatusRequest, StatusResponse, SubmitAnswerRequest, SubmitAnswerResponse,
            RewardPayload, TeacherView, RegisterTeacherRequest, CreateNoteRequest, NoteView,
            NotesResponse
        )
    ),
    tags(
        (name = "Sugoroku Learning API", description = "Chat, quiz and board endpoints for the kids' learning app.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Helpers
//=========================================================================================

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Stream a child-friendly answer to a question.
///
/// The body is an event stream of `{"type":"content","data":...}` frames that
/// ends when the stream closes.
#[utoipa::path(
    post,
    path = "/generate-answer",
    request_body = GenerateAnswerRequest,
    responses(
        (status = 200, description = "Answer stream", body = StreamFrame, content_type = "text/event-stream"),
        (status = 400, description = "Missing fields or upstream failure"),
        (status = 500, description = "Model credential not configured"),
        (status = 504, description = "Upstream did not answer in time")
    )
)]
pub async fn generate_answer_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<GenerateAnswerRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = parse_body(body)?;
    let (Some(query), Some(user_id)) = (required(req.query), required(req.user_id)) else {
        return Err(ApiError::Validation("Missing query or user_id".to_string()));
    };

    let models = app_state.models()?;
    let upstream = models.answers.stream_answer(&query).await.map_err(|e| {
        error!("Failed to start answer stream: {}", e);
        ApiError::from(e)
    })?;

    let (tx, mut rx) = mpsc::channel::<StreamFrame>(RELAY_BUFFER);
    let activity = app_state.storage.as_ref().map(|s| s.activity.clone());
    let idle_timeout = app_state.config.stream_idle_timeout;

    tokio::spawn(async move {
        let outcome = relay_completion(upstream, tx, idle_timeout).await;
        info!(
            "Answer relay for user {} finished: {:?}, {} frames, {} malformed",
            user_id, outcome.end, outcome.forwarded, outcome.malformed
        );
        match activity {
            Some(activity) => {
                spawn_conversation_log(activity, user_id, query, outcome.text);
            }
            None => warn!("No store configured, chat turn for user {} not logged", user_id),
        }
    });

    let events = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            yield Event::default().json_data(&frame);
        }
    };
    Ok(Sse::new(events).into_response())
}

/// Generate a three-choice quiz about a topic.
#[utoipa::path(
    post,
    path = "/generate-quiz",
    request_body = GenerateQuizRequest,
    responses(
        (status = 200, description = "Generated quiz; empty options mean no quiz", body = QuizResponse),
        (status = 400, description = "Missing fields or upstream failure"),
        (status = 500, description = "Model credential not configured"),
        (status = 504, description = "Upstream did not answer in time")
    )
)]
pub async fn generate_quiz_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<GenerateQuizRequest>, JsonRejection>,
) -> Result<Json<QuizResponse>, ApiError> {
    let req = parse_body(body)?;
    let (Some(topic), Some(user_id)) = (required(req.topic), required(req.user_id)) else {
        return Err(ApiError::Validation("Missing topic or user_id".to_string()));
    };

    let models = app_state.models()?;
    let quiz = models.quizzes.synthesize(&topic).await.map_err(|e| {
        error!("Quiz generation for '{}' failed: {}", topic, e);
        ApiError::from(e)
    })?;

    if !quiz.is_available() {
        warn!("No usable quiz for topic '{}'", topic);
    }
    if let Some(storage) = &app_state.storage {
        spawn_quiz_log(storage.activity.clone(), user_id, topic, &quiz);
    }

    Ok(Json(QuizResponse { quiz: quiz.into() }))
}

/// Get the board status for a theme, starting the theme on first access.
#[utoipa::path(
    post,
    path = "/get-status",
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Board status; carries `error` when degraded to defaults", body = StatusResponse),
        (status = 400, description = "Missing fields"),
        (status = 500, description = "Store not configured")
    )
)]
pub async fn get_status_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let req = parse_body(body)?;
    let (Some(user_id), Some(theme)) = (required(req.user_id), required(req.theme)) else {
        return Err(ApiError::Validation("user_id and theme are required".to_string()));
    };

    let storage = app_state.storage()?;
    let view = get_or_create_status(storage.progress.as_ref(), &user_id, &theme).await;

    Ok(Json(StatusResponse {
        theme: view.theme,
        current_position: view.current_position.value(),
        finished: view.finished,
        started_at: view.started_at,
        error: view.error,
    }))
}

/// Submit a quiz answer and move the board token.
#[utoipa::path(
    post,
    path = "/submit-answer",
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "New board position and reward", body = SubmitAnswerResponse),
        (status = 400, description = "Missing fields or progress could not be read", body = SubmitAnswerResponse),
        (status = 500, description = "Store not configured", body = SubmitAnswerResponse)
    )
)]
pub async fn submit_answer_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<SubmitAnswerRequest>, JsonRejection>,
) -> Response {
    match submit(&app_state, body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!("Answer submission failed: {}", e);
            let status = e.status_code();
            (status, Json(SubmitAnswerResponse::failed(e.to_string()))).into_response()
        }
    }
}

async fn submit(
    app_state: &AppState,
    body: Result<Json<SubmitAnswerRequest>, JsonRejection>,
) -> Result<SubmitAnswerResponse, ApiError> {
    let req = parse_body(body)?;
    let (Some(user_id), Some(theme)) = (required(req.user_id), required(req.theme)) else {
        return Err(ApiError::Validation("user_id and theme are required".to_string()));
    };
    let answer = req.answer.unwrap_or_default();

    let storage = app_state.storage()?;
    let outcome = submit_answer(
        storage.progress.as_ref(),
        storage.teachers.as_ref(),
        app_state.config.progress_update_mode,
        AnswerEvent {
            user_id: &user_id,
            theme: &theme,
            selected_option: &answer,
            is_correct: req.is_correct,
        },
    )
    .await?;

    if !outcome.persisted {
        warn!(
            "Position {} for {} on '{}' was not saved",
            outcome.new_position.value(),
            user_id,
            theme
        );
    }

    Ok(SubmitAnswerResponse {
        correct: outcome.correct,
        new_position: outcome.new_position.value(),
        finished: outcome.finished,
        reward: outcome.reward.map(RewardPayload::from),
        error: None,
    })
}

/// Register a shopkeeper teacher.
#[utoipa::path(
    post,
    path = "/teachers",
    request_body = RegisterTeacherRequest,
    responses(
        (status = 201, description = "Teacher registered", body = TeacherView),
        (status = 400, description = "Missing fields"),
        (status = 500, description = "Store not configured or failed")
    )
)]
pub async fn register_teacher_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<RegisterTeacherRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = parse_body(body)?;
    let (Some(name), Some(shop_name), Some(specialty), Some(location), Some(visit_type)) = (
        required(req.name),
        required(req.shop_name),
        required(req.specialty),
        required(req.location),
        required(req.visit_type),
    ) else {
        return Err(ApiError::Validation(
            "name, shop_name, specialty, location and visit_type are required".to_string(),
        ));
    };

    let storage = app_state.storage()?;
    let teacher = storage
        .teachers
        .register_teacher(NewTeacher {
            name,
            shop_name,
            specialty,
            location,
            profile_img_url: required(req.profile_img_url),
            visit_type,
        })
        .await
        .map_err(|e| {
            error!("Failed to register teacher: {}", e);
            ApiError::Internal("Failed to register teacher".to_string())
        })?;

    info!("Registered teacher {} ({})", teacher.shop_name, teacher.id);
    Ok((StatusCode::CREATED, Json(TeacherView::from(teacher))))
}

/// Archive a learning note, typically right after a reward.
#[utoipa::path(
    post,
    path = "/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note saved", body = NoteView),
        (status = 400, description = "Missing fields"),
        (status = 500, description = "Store not configured or failed")
    )
)]
pub async fn create_note_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = parse_body(body)?;
    let (Some(user_id), Some(entry_title)) = (required(req.user_id), required(req.entry_title))
    else {
        return Err(ApiError::Validation("user_id and entry_title are required".to_string()));
    };

    let storage = app_state.storage()?;
    let note = storage
        .notes
        .save_note(NewNote {
            user_id,
            entry_title,
            summary: req.summary,
            knowledge_cards: req.knowledge_card,
            shop_visit_log: req.shop_visit_log,
        })
        .await
        .map_err(|e| {
            error!("Failed to save note: {}", e);
            ApiError::Internal("Failed to save note".to_string())
        })?;

    Ok((StatusCode::CREATED, Json(NoteView::from(note))))
}

/// List a user's notes, newest first.
#[utoipa::path(
    get,
    path = "/notes",
    params(NotesQuery),
    responses(
        (status = 200, description = "The user's notes", body = NotesResponse),
        (status = 400, description = "Missing user_id"),
        (status = 500, description = "Store not configured or failed")
    )
)]
pub async fn list_notes_handler(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<NotesQuery>, QueryRejection>,
) -> Result<Json<NotesResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let Some(user_id) = required(query.user_id) else {
        return Err(ApiError::Validation("user_id is required".to_string()));
    };

    let storage = app_state.storage()?;
    let notes = storage
        .notes
        .get_notes_for_user(&user_id)
        .await
        .map_err(|e| {
            error!("Failed to fetch notes for {}: {}", user_id, e);
            ApiError::Internal("Failed to fetch notes".to_string())
        })?;

    Ok(Json(NotesResponse {
        notes: notes.into_iter().map(NoteView::from).collect(),
    }))
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
