// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Kolang API Server
//!
//! Conversational Korean tutoring: role-play chats with a language model,
//! spoken input, end-of-chat feedback and per-learner chat history.

use kolang_api::{
    config::Config,
    db::Database,
    services::{
        ConversationEngine, GoogleOAuthClient, GoogleOidcVerifier, LanguageModel, OpenAiClient,
        PromptStore, SpeechTranscriber,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Kolang API");

    // Open the database and bring the schema up to date
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!("Database ready");

    let prompts = PromptStore::new(&config.prompt_dir);
    tracing::info!(dir = %prompts.dir().display(), "Prompt templates directory");

    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(&config)?);
    tracing::info!(
        chat_model = %config.chat_model,
        transcribe_model = %config.transcribe_model,
        "OpenAI client initialized"
    );

    let engine = ConversationEngine::new(db.clone(), model.clone(), prompts);
    let transcriber = SpeechTranscriber::new(model);
    let google_oauth = GoogleOAuthClient::new(&config)?;
    let google_oidc_verifier = Arc::new(GoogleOidcVerifier::new(&config)?);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        engine,
        transcriber,
        google_oauth,
        google_oidc_verifier,
    });

    // Build router
    let app = kolang_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kolang_api=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
