// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prompt template loading and placeholder substitution.
//!
//! Templates are plain text files. `$name` and `${name}` are replaced with the
//! matching variable, `$$` produces a literal `$`. A `$` that does not start a
//! placeholder is copied through unchanged.

use std::path::{Path, PathBuf};

use crate::models::{OnboardingProfile, Situation};

const SUMMARY_FILE: &str = "summary.txt";
const FEEDBACK_FILE: &str = "feedback.txt";

/// Prompt template errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read prompt template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt template references unknown placeholder ${0}")]
    UnknownPlaceholder(String),

    #[error("unterminated ${{...}} placeholder in prompt template")]
    Unterminated,
}

/// Loads templates from a directory. Files are re-read on every call so
/// prompt edits take effect without a restart.
#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// System instructions for a situation, personalized with the profile.
    pub async fn situation_prompt(
        &self,
        situation: Situation,
        profile: &OnboardingProfile,
    ) -> Result<String, TemplateError> {
        let template = self.read(situation.prompt_file()).await?;
        render_template(&template, &profile_vars(profile))
    }

    /// Instructions for the end-of-chat summary. Placeholder-free.
    pub async fn summary_prompt(&self) -> Result<String, TemplateError> {
        self.read(SUMMARY_FILE).await
    }

    /// Instructions for end-of-chat feedback, personalized with the profile.
    pub async fn feedback_prompt(
        &self,
        profile: &OnboardingProfile,
    ) -> Result<String, TemplateError> {
        let template = self.read(FEEDBACK_FILE).await?;
        render_template(&template, &profile_vars(profile))
    }

    async fn read(&self, file: &str) -> Result<String, TemplateError> {
        let path = self.dir.join(file);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| TemplateError::Io { path, source })?;
        Ok(text.trim().to_string())
    }
}

fn profile_vars(profile: &OnboardingProfile) -> [(&'static str, &str); 3] {
    [
        ("level", profile.level.as_str()),
        ("purpose", profile.purpose.as_str()),
        ("age", profile.age.as_str()),
    ]
}

/// Substitute `$name` / `${name}` placeholders.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let lookup = |name: &str| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or(TemplateError::Unterminated)?;
            out.push_str(lookup(&braced[..end])?);
            rest = &braced[end + 1..];
        } else {
            let ident_len = identifier_len(after);
            if ident_len == 0 {
                out.push('$');
            } else {
                out.push_str(lookup(&after[..ident_len])?);
            }
            rest = &after[ident_len..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Length in bytes of the `[A-Za-z_][A-Za-z0-9_]*` prefix of `s`.
fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
