// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes shared by unit and integration tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::client::{AuthorizationSession, BoxFuture, TokenExchanger};
use crate::error::AuthError;
use crate::event::LifecycleEvent;
use crate::query;
use crate::registrar::AccountStatus;
use crate::surface::{NotificationSurface, SurfaceEvent, SurfaceSession, UiSurface};
use crate::token::TokenRecord;

static INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Provider token response body.
pub fn token_json(access: &str, refresh: Option<&str>, expires_in: i64) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "expires_in": expires_in,
        "token_type": "Bearer",
    });
    if let (Some(r), Some(map)) = (refresh, body.as_object_mut()) {
        map.insert("refresh_token".to_owned(), serde_json::json!(r));
    }
    body
}

/// A token record as it would sit in the store.
pub fn stored_token(access: &str, refresh: Option<&str>, expires_at: u64) -> TokenRecord {
    TokenRecord {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
        token_type: Some("Bearer".to_owned()),
        expires_in: 3600,
        expires_at: Some(expires_at),
        extra: serde_json::Map::new(),
    }
}

/// Token endpoint on an ephemeral port that replays scripted `(status, body)`
/// responses, repeating the last one once exhausted.
pub struct MockTokenServer {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl MockTokenServer {
    pub async fn start(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);

        let count = Arc::clone(&calls);
        let seen = Arc::clone(&bodies);
        let app = Router::new().route(
            "/token",
            post(move |body: String| {
                let count = Arc::clone(&count);
                let seen = Arc::clone(&seen);
                let resps = Arc::clone(&responses);
                async move {
                    seen.lock().push(body);
                    let idx = count.fetch_add(1, Ordering::Relaxed) as usize;
                    let (status, body) = resps
                        .get(idx)
                        .or_else(|| resps.last())
                        .cloned()
                        .unwrap_or((500, "{}".to_owned()));
                    (
                        axum::http::StatusCode::from_u16(status)
                            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                        body,
                    )
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self { addr, calls, bodies })
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    /// Raw form body of the most recent request.
    pub fn last_body(&self) -> Option<String> {
        self.bodies.lock().last().cloned()
    }
}

/// Scripted [`TokenExchanger`], no network.
///
/// Code responses go through [`TokenRecord::from_response`] and refresh
/// responses through [`TokenRecord::merged`], like the HTTP client.
#[derive(Default)]
pub struct FakeExchanger {
    codes: Mutex<VecDeque<Result<serde_json::Value, AuthError>>>,
    refreshes: Mutex<VecDeque<Result<serde_json::Value, AuthError>>>,
    refresh_delay: Mutex<Duration>,
    pub code_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub exchanged_codes: Mutex<Vec<String>>,
}

impl FakeExchanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_code(self, result: Result<serde_json::Value, AuthError>) -> Self {
        self.codes.lock().push_back(result);
        self
    }

    pub fn on_refresh(self, result: Result<serde_json::Value, AuthError>) -> Self {
        self.refreshes.lock().push_back(result);
        self
    }

    /// Hold every refresh for `delay` before answering.
    pub fn refresh_delay(self, delay: Duration) -> Self {
        *self.refresh_delay.lock() = delay;
        self
    }
}

fn into_map(
    value: serde_json::Value,
) -> Result<serde_json::Map<String, serde_json::Value>, AuthError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(AuthError::InvalidResponse(format!("not an object: {other}"))),
    }
}

impl TokenExchanger for FakeExchanger {
    fn authorization_url(&self, session: &AuthorizationSession) -> String {
        let mut params = vec![("response_type", "code"), ("client_id", "fake")];
        if let Some(ref access_type) = session.access_type {
            params.push(("access_type", access_type.as_str()));
        }
        if let Some(ref state) = session.state {
            params.push(("state", state.as_str()));
        }
        format!("https://provider.test/auth?{}", query::encode(&params))
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<TokenRecord, AuthError>> {
        Box::pin(async move {
            self.code_calls.fetch_add(1, Ordering::Relaxed);
            self.exchanged_codes.lock().push(code.to_owned());
            let next = self.codes.lock().pop_front();
            let value =
                next.unwrap_or_else(|| Err(AuthError::Http("no scripted code".to_owned())))?;
            TokenRecord::from_response(into_map(value)?)
                .map_err(|e| AuthError::InvalidResponse(e.to_string()))
        })
    }

    fn refresh<'a>(
        &'a self,
        existing: &'a TokenRecord,
    ) -> BoxFuture<'a, Result<TokenRecord, AuthError>> {
        Box::pin(async move {
            if existing.refresh_token.is_none() {
                return Err(AuthError::MissingRefreshToken);
            }
            self.refresh_calls.fetch_add(1, Ordering::Relaxed);
            let delay = *self.refresh_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let next = self.refreshes.lock().pop_front();
            let value =
                next.unwrap_or_else(|| Err(AuthError::Http("no scripted refresh".to_owned())))?;
            existing.merged(into_map(value)?).map_err(|e| AuthError::InvalidResponse(e.to_string()))
        })
    }
}

/// One scripted step of a [`FakeSurface`] session.
#[derive(Debug, Clone)]
pub enum Step {
    Event(SurfaceEvent),
    /// Redirect to `redirect_uri?<params>` echoing the opened URL's `state`.
    Redirect { redirect_uri: String, params: String },
}

/// [`UiSurface`] that replays one script per `open`. Without a script the
/// surface stays open until dismissed.
#[derive(Default)]
pub struct FakeSurface {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    pub opened: Mutex<Vec<String>>,
    dismissals: Mutex<Vec<CancellationToken>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, steps: Vec<Step>) -> Self {
        self.scripts.lock().push_back(steps);
        self
    }

    /// Script a provider redirect carrying `params` (plus the session state).
    pub fn redirect(self, redirect_uri: &str, params: &str) -> Self {
        self.script(vec![Step::Redirect {
            redirect_uri: redirect_uri.to_owned(),
            params: params.to_owned(),
        }])
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn dismissed_count(&self) -> usize {
        self.dismissals.lock().iter().filter(|t| t.is_cancelled()).count()
    }
}

impl UiSurface for FakeSurface {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<SurfaceSession, AuthError>> {
        Box::pin(async move {
            self.opened.lock().push(url.to_owned());
            let steps = self.scripts.lock().pop_front().unwrap_or_default();
            let (tx, session) = SurfaceSession::channel();
            self.dismissals.lock().push(session.dismiss.clone());

            let state = query::extract_query(url).get("state").map(str::to_owned);
            for step in steps {
                let event = match step {
                    Step::Event(e) => e,
                    Step::Redirect { redirect_uri, params } => {
                        let mut location = format!("{redirect_uri}?{params}");
                        if let Some(ref s) = state {
                            location.push_str(&format!("&state={}", urlencoding::encode(s)));
                        }
                        SurfaceEvent::Navigated(location)
                    }
                };
                let _ = tx.try_send(event);
            }

            let dismiss = session.dismiss.clone();
            tokio::spawn(async move {
                dismiss.cancelled().await;
                drop(tx);
            });
            Ok(session)
        })
    }
}

/// [`NotificationSurface`] that records everything it is shown.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(String, LifecycleEvent)>>,
    pub attentions: Mutex<Vec<(String, String)>>,
    pub statuses: Mutex<Vec<Vec<AccountStatus>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event kinds seen for `account`, in order.
    pub fn kinds_for(&self, account: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|(a, _)| a == account)
            .map(|(_, e)| e.kind().as_str())
            .collect()
    }
}

impl NotificationSurface for RecordingNotifier {
    fn notify(&self, account: &str, event: &LifecycleEvent) {
        self.events.lock().push((account.to_owned(), event.clone()));
    }

    fn attention(&self, account: &str, message: &str) {
        self.attentions.lock().push((account.to_owned(), message.to_owned()));
    }

    fn status(&self, accounts: &[AccountStatus]) {
        self.statuses.lock().push(accounts.to_vec());
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Assert that an expression returns `Err` whose `Display` contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
