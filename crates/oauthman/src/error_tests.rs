// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    exchange = {
        AuthError::TokenExchange { status: 400, status_text: "Bad Request".to_owned() },
        "token exchange failed: 400 Bad Request"
    },
    mismatch = {
        AuthError::StateMismatch { expected: Some("Y".to_owned()), received: Some("X".to_owned()) },
        "state X does not match session state Y"
    },
    mismatch_missing = {
        AuthError::StateMismatch { expected: Some("Y".to_owned()), received: None },
        "state <none> does not match session state Y"
    },
    denied = {
        AuthError::ProviderDenied { error: "access_denied".to_owned() },
        "provider denied authorization: access_denied"
    },
    aborted_with_state = { AuthError::Aborted { state: Some("s1".to_owned()) }, "session for s1 aborted" },
    aborted_without_state = { AuthError::Aborted { state: None }, "session aborted" },
)]
fn display(err: AuthError, expected: &str) {
    assert_eq!(err.to_string(), expected);
}

#[test]
fn codes_are_distinct() {
    let all = [
        AuthError::TokenExchange { status: 500, status_text: String::new() },
        AuthError::StateMismatch { expected: None, received: None },
        AuthError::ProviderDenied { error: String::new() },
        AuthError::CodeNotFound,
        AuthError::Aborted { state: None },
        AuthError::Persistence(String::new()),
        AuthError::MissingRefreshToken,
        AuthError::NoToken,
        AuthError::Http(String::new()),
        AuthError::InvalidResponse(String::new()),
        AuthError::Surface(String::new()),
    ];
    let mut codes: Vec<&str> = all.iter().map(AuthError::as_str).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), all.len());
}
