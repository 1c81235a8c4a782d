// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OpenAI client for chat completions and audio transcription.
//!
//! The engine depends on the [`LanguageModel`] trait so tests can substitute a
//! scripted model. Calls log model names, latencies and token usage, never
//! message contents or the API key.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::AppError;

const USER_AGENT_VALUE: &str = concat!("kolang-api/", env!("CARGO_PKG_VERSION"));

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A chat-completion call. The model identifier is fixed by the client.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask for a JSON object response
    pub json_output: bool,
}

/// A transcription call.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest<'a> {
    /// Audio file on disk; its extension tells the API the format
    pub audio_path: &'a Path,
    /// ISO-639-1 spoken language
    pub language: &'a str,
    pub temperature: f32,
}

/// Hosted model operations used by the conversation engine.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a chat completion and return the raw content of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError>;

    /// Transcribe an audio file to plain text.
    async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<String, AppError>;
}

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    transcribe_model: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.openai_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("failed building OpenAI client: {e}"))
            })?;

        Ok(Self {
            http,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            transcribe_model: config.transcribe_model.clone(),
        })
    }

    /// Check response status and return the body text if successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<String, AppError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("OpenAI response read failed: {}", e)))?;

        if status.is_success() {
            return Ok(body);
        }

        if status.as_u16() == 429 {
            tracing::warn!("OpenAI rate limit hit (429)");
        }

        let msg = extract_openai_error(&body).unwrap_or(body);
        Err(AppError::Upstream(format!("OpenAI HTTP {status}: {msg}")))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[tracing::instrument(
        level = "info",
        skip(self, request),
        fields(
            model = %self.chat_model,
            messages = request.messages.len(),
            json = request.json_output
        )
    )]
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionBody {
            model: &self.chat_model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("OpenAI request failed: {}", e)))?;

        let text = self.check_response(response).await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::Upstream(format!("Invalid OpenAI response: {}", e)))?;

        if let Some(usage) = &parsed.usage {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                "OpenAI completion received"
            );
        }

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    #[tracing::instrument(
        level = "info",
        skip(self, request),
        fields(model = %self.transcribe_model, language = request.language)
    )]
    async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<String, AppError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let bytes = tokio::fs::read(request.audio_path)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to read audio file: {}", e)))?;
        let file_name = request
            .audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.webm")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", self.transcribe_model.clone())
            .text("language", request.language.to_string())
            .text("temperature", request.temperature.to_string())
            .text("response_format", "json");

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Transcription request failed: {}", e)))?;

        let text = self.check_response(response).await?;
        let parsed: TranscriptionResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::Upstream(format!("Invalid transcription response: {}", e)))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = parsed.text.chars().count(),
            "Transcription received"
        );

        Ok(parsed.text)
    }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorWrapper {
        error: ErrorObject,
    }
    #[derive(Deserialize)]
    struct ErrorObject {
        message: String,
    }

    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .map(|w| w.error.message)
}
