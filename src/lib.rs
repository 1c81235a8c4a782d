// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Kolang: conversational Korean tutoring backend
//!
//! This crate provides the backend API for role-play conversations with a
//! language model, end-of-conversation feedback, speech input, Google sign-in
//! and the chat history of each learner.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{ConversationEngine, GoogleOAuthClient, GoogleOidcVerifier, SpeechTranscriber};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub engine: ConversationEngine,
    pub transcriber: SpeechTranscriber,
    pub google_oauth: GoogleOAuthClient,
    pub google_oidc_verifier: Arc<GoogleOidcVerifier>,
}
