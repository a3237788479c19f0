// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end account flows: real HTTP client against a mock token endpoint,
//! a real loopback redirect listener and the file token store.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use oauthman::agent::NoStateHook;
use oauthman::config::AccountConfig;
use oauthman::error::AuthError;
use oauthman::registrar::{Registrar, Wiring};
use oauthman::store::{FileTokenStore, TokenStore};
use oauthman::surface::loopback::LoopbackSurface;
use oauthman::surface::{Command, NotificationSurface, UiSurface};
use oauthman::test_support::{
    ensure_crypto_provider, stored_token, token_json, wait_for, MockTokenServer, RecordingNotifier,
};
use oauthman::token::{epoch_ms, LifecycleState};

fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn accounts(redirect_uri: &str, token_url: &str) -> IndexMap<String, AccountConfig> {
    let mut accounts = IndexMap::new();
    accounts.insert(
        "work".to_owned(),
        AccountConfig {
            client_id: "cid".to_owned(),
            client_secret: "secret".to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            scope: None,
            authorization_endpoint: None,
            token_endpoint: Some(token_url.to_owned()),
        },
    );
    accounts
}

fn wiring(token_dir: &Path) -> Wiring {
    Wiring {
        token_dir: token_dir.to_owned(),
        surface_for: Box::new(|account: &AccountConfig| -> Result<Arc<dyn UiSurface>, AuthError> {
            let surface = LoopbackSurface::new(&account.redirect_uri, Duration::from_secs(30))?;
            Ok(Arc::new(surface) as Arc<dyn UiSurface>)
        }),
        state_hook: Arc::new(NoStateHook),
    }
}

#[tokio::test]
async fn authenticate_through_loopback_and_restore() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let server =
        MockTokenServer::start(vec![(200, token_json("t1", Some("r1"), 3600).to_string())]).await?;
    let port = free_port()?;
    let redirect = format!("http://127.0.0.1:{port}/callback");
    let accounts = accounts(&redirect, &server.token_url());
    let dir = tempfile::tempdir()?;

    let notifier = Arc::new(RecordingNotifier::new());
    let registrar = Registrar::from_config(
        &accounts,
        &wiring(dir.path()),
        Arc::clone(&notifier) as Arc<dyn NotificationSurface>,
    )?;
    registrar.start().await;
    assert_eq!(registrar.status()[0].state, LifecycleState::Inactive);

    registrar.dispatch(Command::Authenticate("work".to_owned()));

    // Play the browser: hit the redirect once the listener is up.
    let http = reqwest::Client::new();
    let mut redirected = false;
    for _ in 0..200 {
        if http.get(format!("{redirect}?code=4%2Fabc")).send().await.is_ok() {
            redirected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(redirected, "redirect listener never came up");

    let n = Arc::clone(&notifier);
    assert!(
        wait_for(Duration::from_secs(5), || {
            n.kinds_for("work") == vec!["authenticating", "token", "authenticated"]
        })
        .await
    );
    assert_eq!(server.calls.load(Ordering::Relaxed), 1);
    let form = oauthman::query::decode(&server.last_body().unwrap_or_default());
    assert_eq!(form.get("code"), Some("4/abc"));
    assert_eq!(form.get("grant_type"), Some("authorization_code"));

    let stored = FileTokenStore::for_account(dir.path(), "work").load();
    assert_eq!(stored.as_ref().and_then(|t| t.refresh_token.as_deref()), Some("r1"));
    assert!(stored.as_ref().and_then(|t| t.expires_at).is_some_and(|at| at > epoch_ms()));
    registrar.shutdown();

    // A second process picks the stored token up without any exchange.
    let restored = Registrar::from_config(
        &accounts,
        &wiring(dir.path()),
        Arc::new(RecordingNotifier::new()) as Arc<dyn NotificationSurface>,
    )?;
    restored.start().await;
    let status = restored.status();
    assert_eq!(status[0].state, LifecycleState::Active);
    assert!(status[0].has_refresh_token);
    assert!(restored.manager("work").is_some_and(|m| m.refresh_pending()));
    assert_eq!(server.calls.load(Ordering::Relaxed), 1);
    restored.shutdown();
    Ok(())
}

#[tokio::test]
async fn expired_file_is_refreshed_on_start() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let body = serde_json::json!({ "access_token": "t2", "expires_in": 3600, "refresh_token": null });
    let server = MockTokenServer::start(vec![(200, body.to_string())]).await?;
    let dir = tempfile::tempdir()?;
    let store = FileTokenStore::for_account(dir.path(), "work");
    store.save(&stored_token("t1", Some("r1"), epoch_ms() - 5_000))?;

    let accounts = accounts("http://127.0.0.1:1/callback", &server.token_url());
    let notifier = Arc::new(RecordingNotifier::new());
    let registrar = Registrar::from_config(
        &accounts,
        &wiring(dir.path()),
        Arc::clone(&notifier) as Arc<dyn NotificationSurface>,
    )?;
    registrar.start().await;

    let refreshed = store.load();
    assert_eq!(refreshed.as_ref().map(|t| t.access_token.as_str()), Some("t2"));
    assert_eq!(refreshed.as_ref().and_then(|t| t.refresh_token.as_deref()), Some("r1"));
    assert_eq!(registrar.status()[0].state, LifecycleState::Active);

    let form = oauthman::query::decode(&server.last_body().unwrap_or_default());
    assert_eq!(form.get("refresh_token"), Some("r1"));
    let n = Arc::clone(&notifier);
    assert!(
        wait_for(Duration::from_secs(5), || {
            n.kinds_for("work") == vec!["refreshing", "token", "refreshed"]
        })
        .await
    );
    registrar.shutdown();
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_leaves_file_untouched() -> anyhow::Result<()> {
    ensure_crypto_provider();
    let server = MockTokenServer::start(vec![(401, r#"{"error":"invalid_grant"}"#.to_owned())]).await?;
    let dir = tempfile::tempdir()?;
    let store = FileTokenStore::for_account(dir.path(), "work");
    let original = stored_token("t1", Some("r1"), epoch_ms() - 5_000);
    store.save(&original)?;

    let notifier = Arc::new(RecordingNotifier::new());
    let registrar = Registrar::from_config(
        &accounts("http://127.0.0.1:1/callback", &server.token_url()),
        &wiring(dir.path()),
        Arc::clone(&notifier) as Arc<dyn NotificationSurface>,
    )?;
    registrar.start().await;

    assert_eq!(store.load(), Some(original));
    assert_eq!(registrar.status()[0].state, LifecycleState::Expired);
    let attentions = notifier.attentions.lock().clone();
    assert_eq!(attentions.len(), 1);
    assert!(attentions[0].1.contains("401"));
    registrar.shutdown();
    Ok(())
}
