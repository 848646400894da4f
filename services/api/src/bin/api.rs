//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiChatStreamAdapter, OpenAiQuizAdapter},
    config::Config,
    error::ApiError,
    web::{
        build_router,
        state::{AppState, Models, Storage},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let storage = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(config.upstream_timeout)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Some(Storage::shared(db_adapter))
        }
        None => {
            warn!("DATABASE_URL is not set; board, teacher and note endpoints will answer 500");
            None
        }
    };

    // --- 3. Initialize Model Adapters ---
    let models = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(&config.openai_base_url);
            let openai_client = Client::with_config(openai_config);

            let quizzes = Arc::new(OpenAiQuizAdapter::new(
                openai_client,
                config.quiz_model.clone(),
                config.upstream_timeout,
            ));
            let answers = Arc::new(OpenAiChatStreamAdapter::new(
                config.openai_base_url.clone(),
                api_key.clone(),
                config.answer_model.clone(),
                config.upstream_timeout,
            ));
            Some(Models { answers, quizzes })
        }
        None => {
            warn!("OPENAI_API_KEY is not set; answer and quiz endpoints will answer 500");
            None
        }
    };

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        storage,
        models,
    });
    let app = build_router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
