// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-of-conversation summary and feedback.
//!
//! Both outputs come from separate JSON-mode model calls. Unparseable output
//! degrades to fixed placeholder text so a chat can always be closed.

use serde_json::Value;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Feedback, OnboardingProfile};
use crate::services::openai::{ChatMessage, CompletionRequest, LanguageModel, Role};
use crate::services::prompts::PromptStore;

pub const SUMMARY_PLACEHOLDER: &str = "요약을 생성할 수 없습니다.";
pub const GRAMMAR_PLACEHOLDER: &str = "문법 피드백을 생성할 수 없습니다.";
pub const STUDY_TIPS_PLACEHOLDER: &str = "학습 팁을 생성할 수 없습니다.";

const REVIEW_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 50;

/// One line of the transcript handed to the reviewer.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptLine<'a> {
    pub is_answer: bool,
    pub text: &'a str,
}

/// Summary and feedback stored on a closed chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReview {
    pub summary: String,
    pub feedback: Feedback,
}

/// Generates the closing review of a chat.
#[derive(Clone)]
pub struct ReviewGenerator {
    model: Arc<dyn LanguageModel>,
    prompts: PromptStore,
}

impl ReviewGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: PromptStore) -> Self {
        Self { model, prompts }
    }

    /// Summarize the conversation and produce feedback for the learner.
    pub async fn review(
        &self,
        transcript: &[TranscriptLine<'_>],
        profile: &OnboardingProfile,
    ) -> Result<ChatReview> {
        let conversation = render_transcript(transcript);

        let summary_prompt = self
            .prompts
            .summary_prompt()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let feedback_prompt = self
            .prompts
            .feedback_prompt(profile)
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let summary_raw = self
            .model
            .complete(CompletionRequest {
                messages: vec![
                    ChatMessage::new(Role::System, summary_prompt),
                    ChatMessage::new(Role::User, conversation.clone()),
                ],
                temperature: REVIEW_TEMPERATURE,
                max_tokens: Some(SUMMARY_MAX_TOKENS),
                json_output: true,
            })
            .await?;

        let feedback_raw = self
            .model
            .complete(CompletionRequest {
                messages: vec![
                    ChatMessage::new(Role::System, feedback_prompt),
                    ChatMessage::new(Role::User, conversation),
                ],
                temperature: REVIEW_TEMPERATURE,
                max_tokens: None,
                json_output: true,
            })
            .await?;

        Ok(ChatReview {
            summary: parse_summary(&summary_raw),
            feedback: parse_feedback(&feedback_raw),
        })
    }
}

/// `AI: ...` / `User: ...` lines joined by newlines.
pub fn render_transcript(lines: &[TranscriptLine<'_>]) -> String {
    lines
        .iter()
        .map(|line| {
            let speaker = if line.is_answer { "AI" } else { "User" };
            format!("{}: {}", speaker, line.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract `summary` from the model output, or the placeholder.
pub fn parse_summary(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| text_field(&v, "summary"))
        .unwrap_or_else(|| {
            tracing::warn!("Summary output was not usable, storing placeholder");
            SUMMARY_PLACEHOLDER.to_string()
        })
}

/// Extract both feedback fields, substituting placeholders per field.
pub fn parse_feedback(raw: &str) -> Feedback {
    let value = serde_json::from_str::<Value>(raw).unwrap_or(Value::Null);

    let grammar_points = text_field(&value, "grammar_points");
    let study_tips = text_field(&value, "study_tips");
    if grammar_points.is_none() || study_tips.is_none() {
        tracing::warn!(
            grammar_points = grammar_points.is_some(),
            study_tips = study_tips.is_some(),
            "Feedback output incomplete, substituting placeholders"
        );
    }

    Feedback {
        grammar_points: grammar_points.unwrap_or_else(|| GRAMMAR_PLACEHOLDER.to_string()),
        study_tips: study_tips.unwrap_or_else(|| STUDY_TIPS_PLACEHOLDER.to_string()),
    }
}

/// A non-empty string field, or an array of strings joined by newlines.
fn text_field(value: &Value, key: &str) -> Option<String> {
    let text = match value.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };

    (!text.is_empty()).then_some(text)
}
