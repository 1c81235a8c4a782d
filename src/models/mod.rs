// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chat;
pub mod situation;
pub mod user;

pub use chat::{Chat, Feedback, Message, NEW_CHAT_SUMMARY};
pub use situation::{Situation, SituationChoice, UnknownSituation};
pub use user::{OnboardingProfile, User};
