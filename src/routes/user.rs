// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account routes for the signed-in user.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::OnboardingProfile;
use crate::time_utils::api_timestamp;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Account routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/user/me", get(get_me).delete(delete_account))
        .route("/api/user/onboarding", post(submit_onboarding))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: String,
    pub onboarding_complete: bool,
    pub level: Option<String>,
    pub purpose: Option<String>,
    pub age: Option<String>,
}

/// Get current user profile.
async fn get_me(Extension(auth): Extension<AuthUser>) -> Json<UserResponse> {
    let user = auth.user;
    Json(UserResponse {
        user_id: user.id,
        email: user.email,
        name: user.name,
        created_at: api_timestamp(user.created_at),
        onboarding_complete: user.onboarding_complete,
        level: user.level,
        purpose: user.purpose,
        age: user.age,
    })
}

// ─── Onboarding ──────────────────────────────────────────────

/// Onboarding submission. Every field is free text.
#[derive(Debug, Deserialize, Validate)]
pub struct OnboardingRequest {
    #[validate(length(min = 1, max = 50))]
    pub level: String,
    #[validate(length(min = 1, max = 200))]
    pub purpose: String,
    #[validate(length(min = 1, max = 20))]
    pub age: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct OnboardingResponse {
    pub success: bool,
    pub level: String,
    pub purpose: String,
    pub age: String,
}

/// Record the learner profile. Allowed once per account.
async fn submit_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<OnboardingRequest>,
) -> Result<Json<OnboardingResponse>> {
    let req = OnboardingRequest {
        level: req.level.trim().to_string(),
        purpose: req.purpose.trim().to_string(),
        age: req.age.trim().to_string(),
    };
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if auth.user.onboarding_complete {
        return Err(AppError::Conflict(
            "Onboarding already completed".to_string(),
        ));
    }

    let profile = OnboardingProfile {
        level: req.level,
        purpose: req.purpose,
        age: req.age,
    };

    // A concurrent submission can still win between the check and the update
    if !state
        .db
        .complete_onboarding(&auth.user.id, &profile)
        .await?
    {
        return Err(AppError::Conflict(
            "Onboarding already completed".to_string(),
        ));
    }

    tracing::info!(user_id = %auth.user.id, "Onboarding completed");

    Ok(Json(OnboardingResponse {
        success: true,
        level: profile.level,
        purpose: profile.purpose,
        age: profile.age,
    }))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
}

/// Soft-delete the account. Chats are kept; the account can no longer sign in.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(user_id = %auth.user.id, "User-initiated account deletion");

    if !state.db.soft_delete_user(&auth.user.id).await? {
        return Err(AppError::NotFound(format!(
            "User {} not found",
            auth.user.id
        )));
    }

    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "Account deleted.".to_string(),
    }))
}
