//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User row. The id is the Google subject identifier.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; deleted users can no longer authenticate
    pub deleted_at: Option<DateTime<Utc>>,
    pub onboarding_complete: bool,
    pub level: Option<String>,
    pub purpose: Option<String>,
    pub age: Option<String>,
}

/// Learner profile captured during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    /// Proficiency level, e.g. "Beginner"
    pub level: String,
    /// Why the learner studies Korean, e.g. "travel"
    pub purpose: String,
    /// Age bracket, e.g. "20s"
    pub age: String,
}

impl User {
    /// The onboarding profile, if onboarding finished with all three fields.
    pub fn onboarding_profile(&self) -> Option<OnboardingProfile> {
        if !self.onboarding_complete {
            return None;
        }

        let field = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(OnboardingProfile {
            level: field(&self.level)?,
            purpose: field(&self.purpose)?,
            age: field(&self.age)?,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
