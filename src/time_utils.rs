// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clock readings shared by sessions, OAuth state and API payloads.

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamp as the API emits it: RFC 3339, whole seconds, `Z` suffix.
pub fn api_timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Seconds since the Unix epoch, for JWT `iat`/`exp` claims.
pub fn unix_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Milliseconds since the Unix epoch, for OAuth state issue times.
pub fn unix_millis() -> u128 {
    u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}
