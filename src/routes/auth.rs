// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in routes.
//!
//! The OAuth `state` parameter carries the frontend URL, a timestamp and a
//! per-login nonce, signed with HMAC-SHA256. The nonce is also stored in a
//! short-lived cookie scoped to the callback path, so a callback is only
//! accepted in the browser that started the login.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE, SESSION_TTL_SECS};
use crate::time_utils::unix_millis;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Readable by the frontend; tells it a session cookie exists.
pub const LOGGED_IN_COOKIE: &str = "kolang_logged_in";
/// Binds an OAuth state to the browser that started the login.
pub const NONCE_COOKIE: &str = "kolang_oauth_nonce";
pub const CALLBACK_PATH: &str = "/auth/google/callback";
/// How long a login may take between redirect and callback.
const STATE_MAX_AGE_MILLIS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(auth_start))
        .route(CALLBACK_PATH, get(auth_callback))
        .route("/auth/logout", post(logout))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// Must be the configured frontend or a local development origin.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to Google's consent screen.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let frontend_url = params
        .redirect_uri
        .filter(|url| is_allowed_frontend(url, &state.config.frontend_url))
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = hex::encode(nonce_bytes);

    let oauth_state = sign_state(
        &frontend_url,
        unix_millis(),
        &nonce,
        &state.config.oauth_state_key,
    )?;
    let callback_url = callback_url(&state, &headers);
    let auth_url = state
        .google_oauth
        .authorize_url(&callback_url, &oauth_state);

    tracing::info!(frontend_url = %frontend_url, "Starting OAuth flow, redirecting to Google");

    let secure = is_secure_frontend(&state.config.frontend_url);
    let max_age = STATE_MAX_AGE_MILLIS as i64 / 1000;
    let jar = jar.add(nonce_cookie(nonce, secure, max_age));

    Ok((jar, Redirect::temporary(&auth_url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code, verify identity, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let secure = is_secure_frontend(&state.config.frontend_url);
    let cookie_nonce = jar.get(NONCE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.add(nonce_cookie(String::new(), secure, 0));

    let verified = params
        .state
        .as_deref()
        .and_then(|s| verify_and_decode_state(s, &state.config.oauth_state_key, unix_millis()));

    let Some(verified) = verified else {
        tracing::warn!("Invalid, expired or tampered OAuth state");
        let redirect = format!("{}?error=invalid_state", state.config.frontend_url);
        return Ok((jar, Redirect::temporary(&redirect)).into_response());
    };

    let nonce_matches = cookie_nonce
        .as_deref()
        .is_some_and(|n| bool::from(n.as_bytes().ct_eq(verified.nonce.as_bytes())));
    if !nonce_matches {
        tracing::warn!("OAuth nonce cookie missing or mismatched");
        let redirect = format!("{}?error=invalid_state", verified.frontend_url);
        return Ok((jar, Redirect::temporary(&redirect)).into_response());
    }

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        let redirect = format!(
            "{}?error={}",
            verified.frontend_url,
            urlencoding::encode(&error)
        );
        return Ok((jar, Redirect::temporary(&redirect)).into_response());
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    tracing::info!("Exchanging authorization code for ID token");
    let id_token = state
        .google_oauth
        .exchange_code(&code, &callback_url(&state, &headers))
        .await?;
    let identity = state
        .google_oidc_verifier
        .verify_id_token(&id_token)
        .await?;

    if state
        .db
        .get_user(&identity.subject)
        .await?
        .is_some_and(|u| u.is_deleted())
    {
        tracing::warn!(user_id = %identity.subject, "Login attempt for deleted account");
        let redirect = format!("{}?error=account_deleted", verified.frontend_url);
        return Ok((jar, Redirect::temporary(&redirect)).into_response());
    }

    state
        .db
        .upsert_login_user(&identity.subject, &identity.email, identity.name.as_deref())
        .await?;

    tracing::info!(user_id = %identity.subject, "OAuth successful, user stored");

    let jwt = create_jwt(&identity.subject, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let max_age = SESSION_TTL_SECS as i64;
    let frontend_url = &state.config.frontend_url;
    let jar = jar
        .add(session_cookie(jwt, secure, max_age))
        .add(logged_in_cookie(frontend_url, secure, max_age));

    let redirect = format!("{}/callback", verified.frontend_url.trim_end_matches('/'));
    Ok((jar, Redirect::temporary(&redirect)).into_response())
}

/// Logout - clear the session cookies.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let secure = is_secure_frontend(&state.config.frontend_url);
    let jar = jar
        .add(session_cookie(String::new(), secure, 0))
        .add(logged_in_cookie(&state.config.frontend_url, secure, 0))
        .add(nonce_cookie(String::new(), secure, 0));

    (StatusCode::NO_CONTENT, jar)
}

// ─── State Signing ───────────────────────────────────────────

/// Decoded contents of a valid OAuth state.
#[derive(Debug, PartialEq, Eq)]
struct VerifiedState {
    frontend_url: String,
    nonce: String,
}

fn sign_state(
    frontend_url: &str,
    timestamp_millis: u128,
    nonce: &str,
    secret: &[u8],
) -> Result<String> {
    // "frontend_url|timestamp_hex|nonce"
    let payload = format!("{}|{:x}|{}", frontend_url, timestamp_millis, nonce);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify HMAC signature and age, and decode the OAuth state parameter.
fn verify_and_decode_state(state: &str, secret: &[u8], now_millis: u128) -> Option<VerifiedState> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Split from the right so a '|' inside the URL stays in the URL
    let mut parts = state_str.rsplitn(4, '|');
    let signature_hex = parts.next()?;
    let nonce = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}|{}", frontend_url, timestamp_hex, nonce);
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let expected_signature = hex::encode(mac.finalize().into_bytes());

    let expected = expected_signature.as_bytes();
    if !bool::from(signature_hex.as_bytes().ct_eq(expected)) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_at = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_millis.saturating_sub(issued_at) > STATE_MAX_AGE_MILLIS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    Some(VerifiedState {
        frontend_url: frontend_url.to_string(),
        nonce: nonce.to_string(),
    })
}

// ─── Helpers ─────────────────────────────────────────────────

/// Callback URL registered with Google: configured, or derived from Host.
fn callback_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(uri) = &state.config.google_redirect_uri {
        return uri.clone();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if is_local_host(host) { "http" } else { "https" };
    format!("{}://{}{}", scheme, host, CALLBACK_PATH)
}

fn is_local_host(host: &str) -> bool {
    host.starts_with("localhost") || host.starts_with("127.0.0.1")
}

fn is_allowed_frontend(url: &str, configured: &str) -> bool {
    url == configured || (url.starts_with("http://") && url_host(url).is_some_and(is_loopback))
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

/// Host part of an absolute URL, without port or path.
fn url_host(url: &str) -> Option<&str> {
    url.split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['/', ':', '?', '#'])
        .next()
        .filter(|h| !h.is_empty())
}

fn is_secure_frontend(frontend_url: &str) -> bool {
    frontend_url.starts_with("https://")
}

/// Parent domain of the frontend host, shared with the API host.
/// None for local and single-label hosts.
fn shared_cookie_domain(frontend_url: &str) -> Option<String> {
    let host = url_host(frontend_url)?;

    if is_local_host(host) || host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    (labels.len() >= 3).then(|| labels[1..].join("."))
}

fn session_cookie(value: String, secure: bool, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn logged_in_cookie(frontend_url: &str, secure: bool, max_age_secs: i64) -> Cookie<'static> {
    let mut cookie = Cookie::build((LOGGED_IN_COOKIE, if max_age_secs > 0 { "1" } else { "" }))
        .path("/")
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build();
    if let Some(domain) = shared_cookie_domain(frontend_url) {
        cookie.set_domain(domain);
    }
    cookie
}

fn nonce_cookie(value: String, secure: bool, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((NONCE_COOKIE, value))
        .path(CALLBACK_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}
