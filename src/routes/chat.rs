// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation routes: text turns, spoken turns and plain transcription.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::SituationChoice;
use crate::services::TurnOutcome;
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Conversation routes. Request bodies up to `max_upload_bytes` are accepted
/// so audio uploads fit.
pub fn routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ai/chat", post(chat_turn))
        .route("/api/ai/stc", post(speech_turn))
        .route("/api/ai/stt", post(speech_to_text))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

// ─── Text Turn ───────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    pub situation: String,
    #[validate(length(max = 2000))]
    pub message: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChatResponse {
    pub user_id: String,
    pub chat_id: String,
    pub response: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub message_count: usize,
    pub situation: String,
    pub conversation_ended: bool,
}

/// Advance a conversation with a typed message.
async fn chat_turn(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let choice = parse_situation(&req.situation)?;
    let chat_id = normalize_chat_id(req.chat_id.as_deref());

    let outcome = state
        .engine
        .advance_turn(&auth.user, choice, &req.message, chat_id)
        .await?;

    Ok(Json(ChatResponse {
        user_id: auth.user.id,
        chat_id: outcome.chat_id,
        response: outcome.reply,
        message_count: outcome.message_count,
        situation: outcome.situation.to_string(),
        conversation_ended: outcome.conversation_ended,
    }))
}

// ─── Spoken Turn ─────────────────────────────────────────────

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SpeechTurnResponse {
    pub user_id: String,
    pub chat_id: String,
    /// What the learner said, as transcribed
    pub message: String,
    pub response: String,
    pub situation: String,
    pub conversation_ended: bool,
}

/// Transcribe an audio upload and advance the conversation with it.
async fn speech_turn(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<SpeechTurnResponse>> {
    let form = read_upload_form(multipart).await?;

    let situation = form
        .situation
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Missing 'situation' field".to_string()))?;
    let choice = parse_situation(situation)?;

    // Checked here as well so an incomplete profile never costs a transcription
    if auth.user.onboarding_profile().is_none() {
        return Err(AppError::ProfileIncomplete);
    }

    let chat_id = normalize_chat_id(form.chat_id.as_deref());
    if let Some(id) = chat_id {
        state
            .db
            .get_active_chat(id, &auth.user.id)
            .await?
            .ok_or(AppError::ConversationNotFound)?;
    }

    let audio = form.audio()?;
    let text = state
        .transcriber
        .transcribe(&audio.bytes, &audio.content_type)
        .await?;

    let TurnOutcome {
        chat_id,
        reply,
        situation,
        conversation_ended,
        ..
    } = state
        .engine
        .advance_turn(&auth.user, choice, &text, chat_id)
        .await?;

    Ok(Json(SpeechTurnResponse {
        user_id: auth.user.id,
        chat_id,
        message: text,
        response: reply,
        situation: situation.to_string(),
        conversation_ended,
    }))
}

// ─── Transcription Only ──────────────────────────────────────

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Transcribe an audio upload without touching any conversation.
async fn speech_to_text(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<TranscriptionResponse>> {
    let form = read_upload_form(multipart).await?;
    let audio = form.audio()?;

    tracing::debug!(
        user_id = %auth.user.id,
        bytes = audio.bytes.len(),
        "Transcription requested"
    );

    let text = state
        .transcriber
        .transcribe(&audio.bytes, &audio.content_type)
        .await?;

    Ok(Json(TranscriptionResponse { text }))
}

// ─── Helpers ─────────────────────────────────────────────────

struct AudioUpload {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Default)]
struct UploadForm {
    file: Option<AudioUpload>,
    situation: Option<String>,
    chat_id: Option<String>,
}

impl UploadForm {
    fn audio(&self) -> Result<&AudioUpload> {
        self.file
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))
    }
}

/// Collect the known multipart fields; unknown fields are skipped.
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
                form.file = Some(AudioUpload {
                    bytes: bytes.to_vec(),
                    content_type,
                });
            }
            "situation" | "chat_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| {
                        AppError::BadRequest(format!("Invalid '{}' field: {}", name, e))
                    })?;
                if name == "situation" {
                    form.situation = Some(value);
                } else {
                    form.chat_id = Some(value);
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

fn parse_situation(raw: &str) -> Result<SituationChoice> {
    raw.parse()
        .map_err(|e: crate::models::UnknownSituation| AppError::BadRequest(e.to_string()))
}

/// Empty and whitespace-only chat ids mean "start a new chat".
fn normalize_chat_id(chat_id: Option<&str>) -> Option<&str> {
    chat_id.map(str::trim).filter(|id| !id.is_empty())
}
