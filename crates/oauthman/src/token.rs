// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token records and the lifecycle state derived from them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds subtracted from the provider-reported lifetime so the scheduled
/// refresh lands before the provider actually expires the token.
pub const SAFETY_MARGIN_SECS: i64 = 300;

/// One granted credential, as returned by the token endpoint plus the locally
/// computed `expires_at`.
///
/// Provider fields this type does not model (`id_token`, `scope`, ...) are
/// kept in `extra` and written back verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Lifetime in seconds as reported by the provider.
    pub expires_in: i64,
    /// Local expiry as milliseconds since the Unix epoch (margin applied).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenRecord {
    /// Parse a token endpoint response body.
    pub fn from_response(
        body: serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::Value::Object(body))
    }

    /// Overlay the fields of a refresh response onto a copy of this record.
    ///
    /// Fields absent from `response` (or `null` in it) keep their current
    /// values, so a provider that omits `refresh_token` leaves the old one in place.
    pub fn merged(
        &self,
        response: serde_json::Map<String, serde_json::Value>,
    ) -> serde_json::Result<Self> {
        let mut fields = match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in response {
            if !value.is_null() {
                fields.insert(key, value);
            }
        }
        Self::from_response(fields)
    }

    /// Lifetime left after the safety margin, zero for grants shorter than it.
    pub fn secured_lifetime(&self) -> Duration {
        let secs = self.expires_in.saturating_sub(SAFETY_MARGIN_SECS);
        Duration::from_secs(secs.max(0) as u64)
    }

    /// Stamp `expires_at` relative to `now_ms`.
    pub fn stamp_expiry(&mut self, now_ms: u64) {
        let lifetime_ms = self.expires_in.saturating_sub(SAFETY_MARGIN_SECS).saturating_mul(1000);
        let expires_at = if lifetime_ms >= 0 {
            now_ms.saturating_add(lifetime_ms as u64)
        } else {
            now_ms.saturating_sub(lifetime_ms.unsigned_abs())
        };
        self.expires_at = Some(expires_at);
    }

    /// Time from `now_ms` until `expires_at`, zero if already past.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        let expires_at = self.expires_at.unwrap_or(0);
        Duration::from_millis(expires_at.saturating_sub(now_ms))
    }
}

/// Derived classification of an account's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No token held.
    Inactive,
    /// Token held but past `expires_at`.
    Expired,
    /// Token held and not yet at `expires_at`.
    Active,
}

impl LifecycleState {
    /// Classify `token` at instant `now_ms`. Exactly at `expires_at` is expired.
    pub fn classify(token: Option<&TokenRecord>, now_ms: u64) -> Self {
        match token {
            None => Self::Inactive,
            Some(t) => match t.expires_at {
                Some(expires_at) if now_ms < expires_at => Self::Active,
                _ => Self::Expired,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::Active => "active",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
