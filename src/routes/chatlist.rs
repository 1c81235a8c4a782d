// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat history routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Chat, Feedback, Message};
use crate::time_utils::api_timestamp;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const MAX_LIMIT: u32 = 50;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chatlist", get(list_chats))
        .route("/api/chatlist/detail/{chat_id}", get(chat_detail))
}

#[derive(Deserialize)]
struct ChatListQuery {
    /// Number of chats; the configured default when absent
    limit: Option<u32>,
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChatSummary {
    pub user_id: String,
    pub chat_id: String,
    pub summary: String,
    pub situation: String,
    pub active: bool,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            user_id: chat.user_id.clone(),
            chat_id: chat.id.clone(),
            summary: chat.summary.clone(),
            situation: chat.situation.clone(),
            active: chat.active,
            created_at: api_timestamp(chat.created_at),
            completed_at: chat.completed_at.map(api_timestamp),
        }
    }
}

/// Most recent chats of the user, newest first.
async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<ChatListQuery>,
) -> Result<Json<Vec<ChatSummary>>> {
    let limit = match params.limit {
        Some(0) => {
            return Err(AppError::BadRequest(
                "Invalid 'limit' parameter: must be at least 1".to_string(),
            ))
        }
        Some(n) => n.min(MAX_LIMIT),
        None => state.config.chat_list_limit.clamp(1, MAX_LIMIT),
    };

    tracing::debug!(user_id = %auth.user.id, limit, "Fetching chat list");

    let chats = state.db.list_recent_chats(&auth.user.id, limit).await?;
    if chats.is_empty() {
        return Err(AppError::NotFound("No chats found".to_string()));
    }

    Ok(Json(chats.iter().map(ChatSummary::from).collect()))
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub message_id: i64,
    pub chat_id: String,
    pub user_id: String,
    pub message: String,
    pub is_answer: bool,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            message_id: m.id,
            chat_id: m.chat_id,
            user_id: m.user_id,
            message: m.body,
            is_answer: m.is_answer,
            created_at: api_timestamp(m.created_at),
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChatDetailResponse {
    #[serde(flatten)]
    #[cfg_attr(feature = "binding-generation", ts(flatten))]
    pub chat: ChatSummary,
    pub feedback: Option<Feedback>,
    pub messages: Vec<MessageResponse>,
}

/// One chat with its full message history, oldest first.
async fn chat_detail(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatDetailResponse>> {
    let chat = state
        .db
        .get_chat(&chat_id, &auth.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No chats found".to_string()))?;

    let messages = state.db.list_messages(&chat.id).await?;

    Ok(Json(ChatDetailResponse {
        chat: ChatSummary::from(&chat),
        feedback: chat.feedback.map(|f| f.0),
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}
