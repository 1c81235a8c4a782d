// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod conversation;
pub mod google_oauth;
pub mod google_oidc;
pub mod openai;
pub mod prompts;
pub mod review;
pub mod transcription;

pub use conversation::{ConversationEngine, TurnOutcome};
pub use google_oauth::GoogleOAuthClient;
pub use google_oidc::{GoogleIdentity, GoogleOidcVerifier, OidcError};
pub use openai::{LanguageModel, OpenAiClient};
pub use prompts::PromptStore;
pub use review::ReviewGenerator;
pub use transcription::SpeechTranscriber;
