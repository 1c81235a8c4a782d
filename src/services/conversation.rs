// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation engine: one learner utterance in, one tutor reply out.
//!
//! A turn resolves the situation and chat, assembles the prompt from the
//! situation template and the chat history, asks the model for a reply and an
//! end signal, and commits everything the turn produced in one transaction.
//! When the model ends the conversation the chat is closed in the same
//! transaction with a generated summary and feedback.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::db::{ChatClosure, Database, NewChat, TurnCommit};
use crate::error::{AppError, Result};
use crate::models::{Message, Situation, SituationChoice, User};
use crate::services::openai::{ChatMessage, CompletionRequest, LanguageModel, Role};
use crate::services::prompts::PromptStore;
use crate::services::review::{ReviewGenerator, TranscriptLine};

/// Prefix on every quoted prior turn.
pub const HISTORY_MARKER: &str = "[이전 대화 기록] ";
/// Prefix on the utterance the model should answer.
pub const LIVE_MARKER: &str = "[현재 메시지] ";
/// Reply used when the model output cannot be parsed.
pub const REPLY_PLACEHOLDER: &str = "응답을 처리할 수 없습니다.";

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub chat_id: String,
    pub reply: String,
    pub situation: Situation,
    /// Completed learner/assistant pairs in the chat, this turn included
    pub message_count: usize,
    pub conversation_ended: bool,
}

/// The model's reply and end signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub ended: bool,
}

/// Runs conversation turns.
#[derive(Clone)]
pub struct ConversationEngine {
    db: Database,
    model: Arc<dyn LanguageModel>,
    prompts: PromptStore,
    reviewer: ReviewGenerator,
}

impl ConversationEngine {
    pub fn new(db: Database, model: Arc<dyn LanguageModel>, prompts: PromptStore) -> Self {
        let reviewer = ReviewGenerator::new(model.clone(), prompts.clone());
        Self {
            db,
            model,
            prompts,
            reviewer,
        }
    }

    /// Advance a conversation by one turn.
    ///
    /// Without `chat_id` a new chat is started. With it, the chat must be
    /// active and owned by `user`, otherwise the turn fails with
    /// [`AppError::ConversationNotFound`]. Nothing is written unless the
    /// whole turn succeeds.
    #[tracing::instrument(level = "info", skip(self, user, utterance), fields(user_id = %user.id))]
    pub async fn advance_turn(
        &self,
        user: &User,
        choice: SituationChoice,
        utterance: &str,
        chat_id: Option<&str>,
    ) -> Result<TurnOutcome> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(AppError::BadRequest(
                "Message must not be empty".to_string(),
            ));
        }

        let existing = match chat_id {
            Some(id) => Some(
                self.db
                    .get_active_chat(id, &user.id)
                    .await?
                    .ok_or(AppError::ConversationNotFound)?,
            ),
            None => None,
        };

        let situation = match (choice, &existing) {
            (SituationChoice::Fixed(situation), _) => situation,
            (SituationChoice::Random, Some(chat)) => chat.situation().unwrap_or_else(|| {
                tracing::warn!(
                    chat_id = %chat.id,
                    stored = %chat.situation,
                    "Stored situation is unknown, drawing a new one"
                );
                Situation::random(&mut rand::thread_rng())
            }),
            (SituationChoice::Random, None) => Situation::random(&mut rand::thread_rng()),
        };

        let (chat_id, new_chat, history) = match existing {
            Some(chat) => {
                let history = self.db.list_messages(&chat.id).await?;
                (chat.id, None, history)
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                let new_chat = NewChat {
                    id: id.clone(),
                    user_id: user.id.clone(),
                    situation: situation.as_str().to_string(),
                };
                (id, Some(new_chat), Vec::new())
            }
        };

        let profile = user
            .onboarding_profile()
            .ok_or(AppError::ProfileIncomplete)?;

        let instructions = self
            .prompts
            .situation_prompt(situation, &profile)
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let raw = self
            .model
            .complete(CompletionRequest {
                messages: build_turn_messages(&instructions, &history, utterance),
                temperature: 0.0,
                max_tokens: None,
                json_output: true,
            })
            .await?;
        let reply = parse_model_reply(&raw);

        let closure = if reply.ended {
            let mut transcript: Vec<TranscriptLine<'_>> = history
                .iter()
                .map(|m| TranscriptLine {
                    is_answer: m.is_answer,
                    text: &m.body,
                })
                .collect();
            transcript.push(TranscriptLine {
                is_answer: false,
                text: utterance,
            });
            transcript.push(TranscriptLine {
                is_answer: true,
                text: &reply.text,
            });

            let review = self.reviewer.review(&transcript, &profile).await?;
            Some(ChatClosure {
                summary: review.summary,
                feedback: review.feedback,
                completed_at: Utc::now(),
            })
        } else {
            None
        };

        self.db
            .commit_turn(&TurnCommit {
                new_chat,
                chat_id: chat_id.clone(),
                user_id: user.id.clone(),
                utterance: utterance.to_string(),
                reply: reply.text.clone(),
                closure,
            })
            .await?;

        let message_count = history.len() / 2 + 1;
        tracing::info!(
            chat_id = %chat_id,
            situation = %situation,
            message_count,
            ended = reply.ended,
            "Conversation turn committed"
        );

        Ok(TurnOutcome {
            chat_id,
            reply: reply.text,
            situation,
            message_count,
            conversation_ended: reply.ended,
        })
    }
}

/// Assemble the message list for a turn.
///
/// The system instructions come first, then every prior message tagged with
/// [`HISTORY_MARKER`], then the live utterance tagged with [`LIVE_MARKER`].
pub fn build_turn_messages(
    instructions: &str,
    history: &[Message],
    utterance: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(Role::System, instructions));

    for message in history {
        let role = if message.is_answer {
            Role::Assistant
        } else {
            Role::User
        };
        messages.push(ChatMessage::new(
            role,
            format!("{}{}", HISTORY_MARKER, message.body),
        ));
    }

    messages.push(ChatMessage::new(
        Role::User,
        format!("{}{}", LIVE_MARKER, utterance),
    ));
    messages
}

/// Parse `{"response": ..., "end": ...}`, falling back to a fixed reply.
///
/// Only the `response` text decides whether the reply is usable. The end
/// flag is read from `end`, then from the legacy `error` key; anything but a
/// bool there counts as `false`.
pub fn parse_model_reply(raw: &str) -> ModelReply {
    let value = serde_json::from_str::<Value>(raw).ok();

    let Some(text) = value
        .as_ref()
        .and_then(|v| v.get("response"))
        .and_then(Value::as_str)
    else {
        tracing::warn!("Model reply was not usable, substituting placeholder");
        return ModelReply {
            text: REPLY_PLACEHOLDER.to_string(),
            ended: false,
        };
    };

    let ended = ["end", "error"]
        .iter()
        .find_map(|key| value.as_ref()?.get(*key)?.as_bool())
        .unwrap_or(false);

    ModelReply {
        text: text.to_string(),
        ended,
    }
}
