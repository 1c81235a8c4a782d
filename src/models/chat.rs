// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Chat and message models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use super::Situation;

/// Summary stored on a chat until the conversation ends.
pub const NEW_CHAT_SUMMARY: &str = "New conversation";

/// Chat row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chat {
    /// UUID v4
    pub id: String,
    pub user_id: String,
    /// Concrete situation tag (never the random selector)
    pub situation: String,
    pub summary: String,
    pub feedback: Option<Json<Feedback>>,
    /// Whether the chat still accepts turns
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Chat {
    /// Parse the stored situation tag.
    pub fn situation(&self) -> Option<Situation> {
        self.situation.parse().ok()
    }
}

/// End-of-conversation feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Feedback {
    pub grammar_points: String,
    pub study_tips: String,
}

/// Message row. Ordered by `(created_at, id)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub chat_id: String,
    pub user_id: String,
    pub body: String,
    /// true when the assistant wrote it
    pub is_answer: bool,
    pub created_at: DateTime<Utc>,
}
