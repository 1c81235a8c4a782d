// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use kolang_api::config::Config;
use kolang_api::db::Database;
use kolang_api::error::AppError;
use kolang_api::models::{OnboardingProfile, User};
use kolang_api::routes::create_router;
use kolang_api::services::openai::{CompletionRequest, LanguageModel, TranscriptionRequest};
use kolang_api::services::{
    ConversationEngine, GoogleOAuthClient, GoogleOidcVerifier, PromptStore, SpeechTranscriber,
};
use kolang_api::AppState;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const TEST_OIDC_KID: &str = "test-kid";
pub const TEST_OIDC_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/oidc_test_key.pem");
const TEST_OIDC_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/oidc_test_key.pub.pem");

/// One scripted model outcome.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Scripted {
    Reply(String),
    Fail(String),
}

/// What a transcription call saw.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SeenAudio {
    pub path: PathBuf,
    pub existed: bool,
    pub bytes: Vec<u8>,
    pub language: String,
}

/// Language model double with queued answers and a call log.
#[derive(Default)]
pub struct ScriptedModel {
    completions: Mutex<VecDeque<Scripted>>,
    transcriptions: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    audio: Mutex<Vec<SeenAudio>>,
}

#[allow(dead_code)]
impl ScriptedModel {
    pub fn push_reply(&self, content: impl Into<String>) {
        self.completions
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(content.into()));
    }

    /// Queue a conversation reply in the expected JSON shape.
    pub fn push_turn(&self, response: &str, end: bool) {
        self.push_reply(serde_json::json!({ "response": response, "end": end }).to_string());
    }

    /// Queue the summary and feedback replies of a closing turn.
    pub fn push_review(&self, summary: &str, grammar_points: &str, study_tips: &str) {
        self.push_reply(serde_json::json!({ "summary": summary }).to_string());
        self.push_reply(
            serde_json::json!({ "grammar_points": grammar_points, "study_tips": study_tips })
                .to_string(),
        );
    }

    pub fn push_failure(&self, message: &str) {
        self.completions
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub fn push_transcript(&self, text: &str) {
        self.transcriptions
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(text.to_string()));
    }

    pub fn push_transcription_failure(&self, message: &str) {
        self.transcriptions
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn completion_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn audio(&self) -> Vec<SeenAudio> {
        self.audio.lock().unwrap().clone()
    }
}

fn play(next: Option<Scripted>) -> Result<String, AppError> {
    match next {
        Some(Scripted::Reply(content)) => Ok(content),
        Some(Scripted::Fail(message)) => Err(AppError::Upstream(message)),
        None => Err(AppError::Upstream("no scripted reply left".to_string())),
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request);
        play(self.completions.lock().unwrap().pop_front())
    }

    async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<String, AppError> {
        let bytes = std::fs::read(request.audio_path).unwrap_or_default();
        self.audio.lock().unwrap().push(SeenAudio {
            path: request.audio_path.to_path_buf(),
            existed: request.audio_path.exists(),
            bytes,
            language: request.language.to_string(),
        });
        play(self.transcriptions.lock().unwrap().pop_front())
    }
}

/// Fresh in-memory database with the schema applied.
#[allow(dead_code)]
pub async fn test_db() -> Database {
    let db = Database::connect_with_pool_size("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory SQLite");
    db.migrate().await.expect("Failed to run migrations");
    db
}

/// ID token verifier that trusts only the fixture key.
#[allow(dead_code)]
pub fn test_oidc_verifier(config: &Config) -> GoogleOidcVerifier {
    let key = DecodingKey::from_rsa_pem(TEST_OIDC_PUBLIC_KEY).expect("Invalid fixture public key");
    GoogleOidcVerifier::new_with_static_key(config, TEST_OIDC_KID, key)
        .expect("Failed to build OIDC verifier")
}

/// Create a test app over an in-memory database and a scripted model.
/// Returns the router, the shared state and the model.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<ScriptedModel>) {
    create_test_app_with_config(Config::test_default()).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_frontend_url(
    frontend_url: &str,
) -> (axum::Router, Arc<AppState>, Arc<ScriptedModel>) {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_config(
    config: Config,
) -> (axum::Router, Arc<AppState>, Arc<ScriptedModel>) {
    build_test_app(config, None).await
}

/// Test app whose Google token exchange goes to `token_url`.
#[allow(dead_code)]
pub async fn create_test_app_with_token_url(
    token_url: &str,
) -> (axum::Router, Arc<AppState>, Arc<ScriptedModel>) {
    build_test_app(Config::test_default(), Some(token_url)).await
}

async fn build_test_app(
    config: Config,
    token_url: Option<&str>,
) -> (axum::Router, Arc<AppState>, Arc<ScriptedModel>) {
    let db = test_db().await;
    let model = Arc::new(ScriptedModel::default());
    let language_model: Arc<dyn LanguageModel> = model.clone();

    let engine = ConversationEngine::new(
        db.clone(),
        language_model.clone(),
        PromptStore::new(&config.prompt_dir),
    );
    let transcriber = SpeechTranscriber::new(language_model);
    let mut google_oauth = GoogleOAuthClient::new(&config).expect("Failed to build OAuth client");
    if let Some(url) = token_url {
        google_oauth = google_oauth.with_token_url(url);
    }
    let google_oidc_verifier = Arc::new(test_oidc_verifier(&config));

    let state = Arc::new(AppState {
        config,
        db,
        engine,
        transcriber,
        google_oauth,
        google_oidc_verifier,
    });

    (create_router(state.clone()), state, model)
}

/// Sign Google-style ID token claims with the fixture key.
#[allow(dead_code)]
pub fn sign_test_id_token(claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_OIDC_KID.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_OIDC_PRIVATE_KEY).expect("Invalid fixture key");
    jsonwebtoken::encode(&header, claims, &key).expect("Failed to sign ID token")
}

/// Claims of a valid ID token for `subject`, issued now.
#[allow(dead_code)]
pub fn google_claims(config: &Config, subject: &str) -> serde_json::Value {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    serde_json::json!({
        "iss": "https://accounts.google.com",
        "aud": config.google_client_id,
        "sub": subject,
        "email": format!("{subject}@example.com"),
        "email_verified": true,
        "name": "Test Learner",
        "iat": now,
        "exp": now + 3600,
    })
}

/// Serve a stand-in Google token endpoint answering every exchange with
/// `id_token`. Returns the endpoint URL.
#[allow(dead_code)]
pub async fn spawn_token_endpoint(id_token: String) -> String {
    let app = axum::Router::new().route(
        "/token",
        axum::routing::post(move || {
            let id_token = id_token.clone();
            async move { axum::Json(serde_json::json!({ "id_token": id_token })) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind token endpoint");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}/token")
}

/// Create a session token for a user id.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    kolang_api::middleware::auth::create_jwt(user_id, signing_key).expect("Failed to create JWT")
}

/// Default learner profile used by the tests.
#[allow(dead_code)]
pub fn test_profile() -> OnboardingProfile {
    OnboardingProfile {
        level: "Beginner".to_string(),
        purpose: "travel".to_string(),
        age: "20s".to_string(),
    }
}

/// Insert a user, optionally with a completed onboarding profile.
#[allow(dead_code)]
pub async fn seed_user(db: &Database, user_id: &str, onboarded: bool) -> User {
    let email = format!("{user_id}@example.com");
    db.upsert_login_user(user_id, &email, Some("Test Learner"))
        .await
        .expect("Failed to insert user");
    if onboarded {
        let completed = db
            .complete_onboarding(user_id, &test_profile())
            .await
            .expect("Failed to onboard user");
        assert!(completed);
    }
    db.get_user(user_id)
        .await
        .expect("Failed to load user")
        .expect("User missing after insert")
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// JSON POST with a bearer token.
#[allow(dead_code)]
pub fn post_json(uri: &str, token: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// GET with a bearer token.
#[allow(dead_code)]
pub fn get_authed(uri: &str, token: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub const MULTIPART_BOUNDARY: &str = "kolang-test-boundary";

/// Build a multipart/form-data body. Parts are `(name, content_type, bytes)`;
/// parts with a content type are sent as files.
#[allow(dead_code)]
pub fn multipart_request(
    uri: &str,
    token: &str,
    parts: &[(&str, Option<&str>, &[u8])],
) -> axum::http::Request<Body> {
    let mut body = Vec::new();
    for (name, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        let disposition = match content_type {
            Some(_) => format!("form-data; name=\"{name}\"; filename=\"recording\""),
            None => format!("form-data; name=\"{name}\""),
        };
        body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
