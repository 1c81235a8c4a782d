//! Application configuration loaded from environment variables.
//!
//! `ENV_STATE=prod` selects `.env.prod`, anything else `.env.dev`; a plain
//! `.env` is read afterwards for values neither file set.

use std::env;
use std::path::PathBuf;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Explicit OAuth callback URL; derived from the Host header when unset
    pub google_redirect_uri: Option<String>,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// SQLite connection URL
    pub database_url: String,
    /// Directory holding the prompt templates
    pub prompt_dir: PathBuf,
    pub openai_base_url: String,
    pub chat_model: String,
    pub transcribe_model: String,
    pub openai_timeout_secs: u64,
    /// Number of chats returned by the chat list when no limit is given
    pub chat_list_limit: u32,
    /// Upper bound for audio uploads
    pub max_upload_bytes: usize,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    pub openai_api_key: String,
}

pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:kolang.db?mode=rwc";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TRANSCRIBE_MODEL: &str = "whisper-1";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            google_redirect_uri: None,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            port: 8080,
            database_url: "sqlite::memory:".to_string(),
            prompt_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("prompts"),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            transcribe_model: DEFAULT_TRANSCRIBE_MODEL.to_string(),
            openai_timeout_secs: 5,
            chat_list_limit: 10,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            google_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!".to_vec(),
            openai_api_key: "sk-test".to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_file = match env::var("ENV_STATE").as_deref() {
            Ok("prod") => ".env.prod",
            _ => ".env.dev",
        };
        dotenvy::from_filename(env_file).ok();
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_redirect_uri: env::var("GOOGLE_REDIRECT_URI")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string()),
            port: parse_or("PORT", 8080)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            prompt_dir: env::var("PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("prompts")),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            chat_model: env::var("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string()),
            transcribe_model: env::var("OPENAI_TRANSCRIBE_MODEL")
                .unwrap_or_else(|_| DEFAULT_TRANSCRIBE_MODEL.to_string()),
            openai_timeout_secs: parse_or("OPENAI_TIMEOUT_SECS", 60)?,
            chat_list_limit: parse_or("CHAT_LIST_LIMIT", 10)?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,

            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
            openai_api_key: required("OPENAI_API_KEY")?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
