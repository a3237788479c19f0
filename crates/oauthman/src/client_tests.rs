// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;

use crate::test_support::{ensure_crypto_provider, MockTokenServer};

use super::*;

fn config() -> ClientConfig {
    ClientConfig {
        client_id: "cid".to_owned(),
        client_secret: "secret".to_owned(),
        redirect_uri: "http://localhost:8085/callback".to_owned(),
    }
}

fn client_for(server: &MockTokenServer) -> anyhow::Result<AuthClient> {
    ensure_crypto_provider();
    let mut profile = ProviderProfile::google();
    profile.token_endpoint = server.token_url();
    Ok(AuthClient::new(config(), profile)?)
}

fn stored(refresh_token: Option<&str>) -> TokenRecord {
    let mut extra = serde_json::Map::new();
    extra.insert("id_token".to_owned(), serde_json::json!("jwt"));
    TokenRecord {
        access_token: "old".to_owned(),
        refresh_token: refresh_token.map(str::to_owned),
        token_type: Some("Bearer".to_owned()),
        expires_in: 3600,
        expires_at: Some(1_000),
        extra,
    }
}

#[test]
fn authorization_url_uses_profile_defaults() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let client = AuthClient::new(config(), ProviderProfile::google())?;
    let url = client.authorization_url(&AuthorizationSession::default());

    let (base, query) = url.split_once('?').ok_or_else(|| anyhow::anyhow!("no query"))?;
    assert_eq!(base, "https://accounts.google.com/o/oauth2/auth");
    assert!(query.starts_with("response_type=code&client_id=cid&"));

    let params = crate::query::decode(query);
    assert_eq!(params.get("redirect_uri"), Some("http://localhost:8085/callback"));
    assert_eq!(params.get("scope"), Some("https://www.googleapis.com/auth/userinfo.email"));
    assert_eq!(params.get("access_type"), Some("online"));
    assert_eq!(params.get("approval_prompt"), Some("auto"));
    assert_eq!(params.get("state"), None);
    Ok(())
}

#[test]
fn authorization_url_session_overrides() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let client = AuthClient::new(config(), ProviderProfile::google())?;
    let session = AuthorizationSession {
        state: Some("s1".to_owned()),
        scope: Some(vec!["email".to_owned(), "profile".to_owned()]),
        access_type: Some("offline".to_owned()),
        approval_prompt: Some("force".to_owned()),
    };
    let params = crate::query::extract_query(&client.authorization_url(&session));
    assert_eq!(params.get("scope"), Some("email profile"));
    assert_eq!(params.get("access_type"), Some("offline"));
    assert_eq!(params.get("approval_prompt"), Some("force"));
    assert_eq!(params.get("state"), Some("s1"));
    Ok(())
}

#[tokio::test]
async fn exchange_code_posts_form_and_parses_token() -> anyhow::Result<()> {
    let body = serde_json::json!({
        "access_token": "t1",
        "refresh_token": "r1",
        "expires_in": 3600,
        "token_type": "Bearer",
    });
    let server = MockTokenServer::start(vec![(200, body.to_string())]).await?;
    let client = client_for(&server)?;

    let token = client.exchange_code("4/abc").await?;
    assert_eq!(token.access_token, "t1");
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert_eq!(token.expires_at, None);

    let form = crate::query::decode(&server.last_body().unwrap_or_default());
    assert_eq!(form.get("code"), Some("4/abc"));
    assert_eq!(form.get("client_id"), Some("cid"));
    assert_eq!(form.get("client_secret"), Some("secret"));
    assert_eq!(form.get("redirect_uri"), Some("http://localhost:8085/callback"));
    assert_eq!(form.get("grant_type"), Some("authorization_code"));
    Ok(())
}

#[tokio::test]
async fn exchange_code_non_200_is_token_exchange() -> anyhow::Result<()> {
    let cases = [
        (400, "Bad Request"),
        (401, "Unauthorized"),
        (500, "Internal Server Error"),
        (201, "Created"),
    ];
    for (status, text) in cases {
        let server =
            MockTokenServer::start(vec![(status, r#"{"error":"invalid_grant"}"#.to_owned())]).await?;
        let client = client_for(&server)?;

        let err = client.exchange_code("bad").await.err();
        assert_eq!(
            err,
            Some(AuthError::TokenExchange { status, status_text: text.to_owned() }),
            "status {status}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn exchange_code_undecodable_body_is_invalid_response() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![(200, "not json".to_owned())]).await?;
    let client = client_for(&server)?;
    assert!(matches!(client.exchange_code("c").await, Err(AuthError::InvalidResponse(_))));
    Ok(())
}

#[tokio::test]
async fn refresh_merges_and_retains_refresh_token() -> anyhow::Result<()> {
    let body = serde_json::json!({ "access_token": "new", "expires_in": 1800 });
    let server = MockTokenServer::start(vec![(200, body.to_string())]).await?;
    let client = client_for(&server)?;

    let existing = stored(Some("r1"));
    let token = client.refresh(&existing).await?;
    assert_eq!(token.access_token, "new");
    assert_eq!(token.expires_in, 1800);
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert_eq!(token.extra.get("id_token"), Some(&serde_json::json!("jwt")));

    let form = crate::query::decode(&server.last_body().unwrap_or_default());
    assert_eq!(form.get("refresh_token"), Some("r1"));
    assert_eq!(form.get("grant_type"), Some("refresh_token"));
    assert_eq!(form.get("redirect_uri"), None);
    Ok(())
}

#[tokio::test]
async fn refresh_without_refresh_token_makes_no_request() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![(200, "{}".to_owned())]).await?;
    let client = client_for(&server)?;

    let err = client.refresh(&stored(None)).await.err();
    assert_eq!(err, Some(AuthError::MissingRefreshToken));
    assert_eq!(server.calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_is_http_error() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut profile = ProviderProfile::google();
    profile.token_endpoint = format!("http://{addr}/token");
    let client = AuthClient::new(config(), profile)?;
    assert!(matches!(client.exchange_code("c").await, Err(AuthError::Http(_))));
    Ok(())
}
