// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failures of the token lifecycle: provider exchanges, redirect correlation,
/// persistence, and misuse of the manager.
///
/// `Clone` so a single failure can travel inside broadcast events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint answered a code or refresh exchange with a non-200 status.
    #[error("token exchange failed: {status} {status_text}")]
    TokenExchange { status: u16, status_text: String },

    /// The redirect carried a `state` that does not belong to this attempt.
    #[error("state {} does not match session state {}", Shown(.received), Shown(.expected))]
    StateMismatch { expected: Option<String>, received: Option<String> },

    /// The user or provider declined consent (`error=` on the redirect).
    #[error("provider denied authorization: {error}")]
    ProviderDenied { error: String },

    /// The redirect carried neither `code` nor `error`.
    #[error("code not found in redirect")]
    CodeNotFound,

    /// The interactive surface was closed before a redirect matched.
    #[error("session{} aborted", ForState(.state))]
    Aborted { state: Option<String> },

    #[error("token store: {0}")]
    Persistence(String),

    /// A refresh was requested for a record that carries no refresh token.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// `refresh()` was called on a manager that holds no token.
    #[error("no token")]
    NoToken,

    #[error("HTTP error: {0}")]
    Http(String),

    /// A 200 response whose body is not a usable token record.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The interactive surface could not be opened.
    #[error("surface: {0}")]
    Surface(String),
}

impl AuthError {
    /// Short machine-readable code, used in console output and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenExchange { .. } => "TOKEN_EXCHANGE",
            Self::StateMismatch { .. } => "STATE_MISMATCH",
            Self::ProviderDenied { .. } => "PROVIDER_DENIED",
            Self::CodeNotFound => "CODE_NOT_FOUND",
            Self::Aborted { .. } => "ABORTED",
            Self::Persistence(_) => "PERSISTENCE",
            Self::MissingRefreshToken => "MISSING_REFRESH_TOKEN",
            Self::NoToken => "NO_TOKEN",
            Self::Http(_) => "HTTP",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::Surface(_) => "SURFACE",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Renders an optional state value, `<none>` when absent.
struct Shown<'a>(&'a Option<String>);

impl fmt::Display for Shown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(s) => f.write_str(s),
            None => f.write_str("<none>"),
        }
    }
}

/// Renders ` for <state>` when a state is known, nothing otherwise.
struct ForState<'a>(&'a Option<String>);

impl fmt::Display for ForState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(s) => write!(f, " for {s}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
