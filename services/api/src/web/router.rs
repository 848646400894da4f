//! services/api/src/web/router.rs
//!
//! Assembles the HTTP router: endpoints, CORS, body limit and the Swagger UI.

use crate::web::{
    rest::{
        create_note_handler, generate_answer_handler, generate_quiz_handler, get_status_handler,
        health_handler, list_notes_handler, register_teacher_handler, submit_answer_handler,
        ApiDoc,
    },
    state::AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{HeaderName, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Every endpoint answers any origin, including the preflight.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/generate-answer", post(generate_answer_handler))
        .route("/generate-quiz", post(generate_quiz_handler))
        .route("/get-status", post(get_status_handler))
        .route("/submit-answer", post(submit_answer_handler))
        .route("/teachers", post(register_teacher_handler))
        .route("/notes", post(create_note_handler).get(list_notes_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer())
}
