// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Speech-to-text adapter for uploaded audio.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::openai::{LanguageModel, TranscriptionRequest};

/// Spoken language of every upload.
pub const SPOKEN_LANGUAGE: &str = "ko";
const DEFAULT_EXTENSION: &str = ".webm";

/// Map an upload content type to the file extension the API expects.
///
/// Parameters such as `;codecs=opus` are ignored. Unknown types fall back to
/// `.webm`, the format browsers record by default.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "audio/webm" | "video/webm" => ".webm",
        "audio/mp3" => ".mp3",
        "audio/mpeg" => ".mpeg",
        "audio/wav" | "audio/x-wav" => ".wav",
        "audio/m4a" | "audio/x-m4a" => ".m4a",
        "audio/mp4" => ".mp4",
        _ => DEFAULT_EXTENSION,
    }
}

/// Writes uploads to a scratch file and sends them for transcription.
#[derive(Clone)]
pub struct SpeechTranscriber {
    model: Arc<dyn LanguageModel>,
}

impl SpeechTranscriber {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Transcribe raw audio bytes to text.
    ///
    /// The scratch file is removed when it goes out of scope, on success and
    /// on every error path.
    pub async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(AppError::BadRequest("Audio file is empty".to_string()));
        }

        let extension = extension_for_content_type(content_type);
        tracing::debug!(
            content_type,
            extension,
            bytes = audio.len(),
            "Transcribing upload"
        );

        let scratch = write_scratch_file(audio, extension).await?;

        let text = self
            .model
            .transcribe(TranscriptionRequest {
                audio_path: scratch.path(),
                language: SPOKEN_LANGUAGE,
                temperature: 0.0,
            })
            .await?;

        drop(scratch);

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::BadRequest(
                "No speech was recognized in the audio".to_string(),
            ));
        }

        Ok(text)
    }
}

async fn write_scratch_file(audio: &[u8], extension: &str) -> Result<tempfile::NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("kolang-upload-")
        .suffix(extension)
        .tempfile()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create temp file: {}", e)))?;

    tokio::fs::write(file.path(), audio)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to write temp file: {}", e)))?;

    Ok(file)
}
