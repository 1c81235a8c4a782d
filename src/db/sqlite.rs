// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (login upsert, onboarding, soft delete)
//! - Chats (lookup, recent list)
//! - Messages (ordered history)
//! - Turn commits (one transaction per conversation turn)

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{Chat, Feedback, Message, OnboardingProfile, User, NEW_CHAT_SUMMARY};

const DEFAULT_POOL_SIZE: u32 = 10;

/// Chat row to create as part of a turn.
#[derive(Debug, Clone)]
pub struct NewChat {
    pub id: String,
    pub user_id: String,
    pub situation: String,
}

/// Closing update applied when the model ends the conversation.
#[derive(Debug, Clone)]
pub struct ChatClosure {
    pub summary: String,
    pub feedback: Feedback,
    pub completed_at: DateTime<Utc>,
}

/// Everything one turn writes.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    /// Set when the turn starts a new chat
    pub new_chat: Option<NewChat>,
    pub chat_id: String,
    pub user_id: String,
    pub utterance: String,
    pub reply: String,
    /// Set when the turn ends the conversation
    pub closure: Option<ChatClosure>,
}

/// SQLite database client.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        Self::connect_with_pool_size(url, DEFAULT_POOL_SIZE).await
    }

    /// Connect with a custom pool size.
    ///
    /// In-memory databases must use a pool size of 1: each connection to
    /// `sqlite::memory:` opens a separate, empty database.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30));
        if url.contains(":memory:") {
            // Closing the only connection would drop the whole database
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to SQLite: {}", e)))?;

        tracing::info!(url, pool_size, "Connected to SQLite");

        Ok(Self { pool })
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by id, including soft-deleted users.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, deleted_at, onboarding_complete, level, purpose, age
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user that has not been soft-deleted.
    pub async fn get_active_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, deleted_at, onboarding_complete, level, purpose, age
            FROM users
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Create the user on first login or refresh email and name on later ones.
    ///
    /// Soft-deleted users stay deleted.
    pub async fn upsert_login_user(
        &self,
        user_id: &str,
        email: &str,
        name: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at, onboarding_complete)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = COALESCE(excluded.name, users.name)
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store the onboarding profile.
    ///
    /// Returns `false` if the user was missing, deleted, or already onboarded.
    pub async fn complete_onboarding(
        &self,
        user_id: &str,
        profile: &OnboardingProfile,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET onboarding_complete = 1, level = ?, purpose = ?, age = ?
            WHERE id = ? AND deleted_at IS NULL AND onboarding_complete = 0
            "#,
        )
        .bind(&profile.level)
        .bind(&profile.purpose)
        .bind(&profile.age)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark a user as deleted. Rows are never removed.
    pub async fn soft_delete_user(&self, user_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET deleted_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // ─── Chat Operations ─────────────────────────────────────────

    /// Get a chat owned by `user_id`, whether active or not.
    pub async fn get_chat(&self, chat_id: &str, user_id: &str) -> Result<Option<Chat>, AppError> {
        let chat = sqlx::query_as::<_, Chat>(
            r#"
            SELECT id, user_id, situation, summary, feedback, active, created_at, completed_at
            FROM chats
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    /// Get a chat owned by `user_id` that still accepts turns.
    pub async fn get_active_chat(
        &self,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Option<Chat>, AppError> {
        let chat = sqlx::query_as::<_, Chat>(
            r#"
            SELECT id, user_id, situation, summary, feedback, active, created_at, completed_at
            FROM chats
            WHERE id = ? AND user_id = ? AND active = 1
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    /// Most recent chats first.
    pub async fn list_recent_chats(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Chat>, AppError> {
        let chats = sqlx::query_as::<_, Chat>(
            r#"
            SELECT id, user_id, situation, summary, feedback, active, created_at, completed_at
            FROM chats
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    // ─── Message Operations ──────────────────────────────────────

    /// All messages of a chat, oldest first.
    pub async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, chat_id, user_id, body, is_answer, created_at
            FROM messages
            WHERE chat_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    // ─── Turn Commit ─────────────────────────────────────────────

    /// Write one conversation turn atomically.
    ///
    /// Inserts the chat (if new), the learner message, then the assistant
    /// message, and applies the closure if the conversation ended. Either all
    /// of it lands or none of it does.
    pub async fn commit_turn(&self, turn: &TurnCommit) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let now = Utc::now();

        if let Some(chat) = &turn.new_chat {
            sqlx::query(
                r#"
                INSERT INTO chats (id, user_id, situation, summary, active, created_at)
                VALUES (?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(&chat.id)
            .bind(&chat.user_id)
            .bind(&chat.situation)
            .bind(NEW_CHAT_SUMMARY)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for (body, is_answer) in [(&turn.utterance, false), (&turn.reply, true)] {
            sqlx::query(
                r#"
                INSERT INTO messages (chat_id, user_id, body, is_answer, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&turn.chat_id)
            .bind(&turn.user_id)
            .bind(body)
            .bind(is_answer)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        if let Some(closure) = &turn.closure {
            let result = sqlx::query(
                r#"
                UPDATE chats
                SET summary = ?, feedback = ?, active = 0, completed_at = ?
                WHERE id = ? AND active = 1
                "#,
            )
            .bind(&closure.summary)
            .bind(Json(&closure.feedback))
            .bind(closure.completed_at)
            .bind(&turn.chat_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::warn!(
                    chat_id = %turn.chat_id,
                    "Chat was already closed by a concurrent turn"
                );
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit turn: {}", e)))?;

        Ok(())
    }
}
