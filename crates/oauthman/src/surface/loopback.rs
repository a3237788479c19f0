// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback redirect listener: an HTTP server on the `redirect_uri` authority.
//! Every request it receives counts as one navigation of the surface.

use std::time::Duration;

use axum::extract::{OriginalUri, State};
use axum::response::Html;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::BoxFuture;
use crate::error::AuthError;
use crate::surface::{SurfaceEvent, SurfaceSession, UiSurface};

const DONE_PAGE: &str =
    "<html><body><p>Authorization received. You can close this window.</p></body></html>";

pub struct LoopbackSurface {
    /// Scheme and authority exactly as configured, so rebuilt navigations
    /// keep the same prefix as `redirect_uri`.
    origin: String,
    bind_addr: String,
    timeout: Duration,
    active: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl LoopbackSurface {
    /// Listener for `redirect_uri`, closing itself after `timeout` without a
    /// dismissal.
    pub fn new(redirect_uri: &str, timeout: Duration) -> Result<Self, AuthError> {
        let url = url::Url::parse(redirect_uri)
            .map_err(|e| AuthError::Surface(format!("invalid redirect uri {redirect_uri}: {e}")))?;
        if url.scheme() != "http" {
            return Err(AuthError::Surface(format!(
                "redirect uri {redirect_uri} must use http for a loopback listener"
            )));
        }
        let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
            return Err(AuthError::Surface(format!("redirect uri {redirect_uri} has no host")));
        };
        Ok(Self {
            origin: authority_prefix(redirect_uri).to_owned(),
            bind_addr: format!("{host}:{port}"),
            timeout,
            active: Mutex::new(None),
        })
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }
}

impl UiSurface for LoopbackSurface {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<SurfaceSession, AuthError>> {
        Box::pin(async move {
            // The previous listener must release the port before rebinding.
            let previous = self.active.lock().take();
            if let Some((dismiss, server)) = previous {
                dismiss.cancel();
                if let Err(e) = server.await {
                    warn!("previous redirect listener failed: {e}");
                }
            }

            let listener = TcpListener::bind(&self.bind_addr)
                .await
                .map_err(|e| AuthError::Surface(format!("bind {}: {e}", self.bind_addr)))?;
            let (tx, session) = SurfaceSession::channel();

            let app = Router::new()
                .fallback(redirect_handler)
                .with_state(Redirects { origin: self.origin.clone(), tx: tx.clone() });
            let dismiss = session.dismiss.clone();
            let server = tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(dismiss.cancelled_owned())
                    .await
                {
                    warn!("redirect listener error: {e}");
                }
            });
            *self.active.lock() = Some((session.dismiss.clone(), server));

            let dismiss = session.dismiss.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::select! {
                    _ = dismiss.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        debug!("redirect wait timed out");
                        let _ = tx.send(SurfaceEvent::Closed).await;
                    }
                }
            });

            info!(listen = %self.bind_addr, "waiting for authorization redirect");
            eprintln!("Open this URL in a browser to authorize:\n\n  {url}\n");
            Ok(session)
        })
    }
}

/// `scheme://authority` of `uri` as written, without path, query or fragment.
fn authority_prefix(uri: &str) -> &str {
    let start = uri.find("://").map_or(0, |i| i + 3);
    let end = uri[start..].find(['/', '?', '#']).map_or(uri.len(), |i| start + i);
    &uri[..end]
}

#[derive(Clone)]
struct Redirects {
    origin: String,
    tx: mpsc::Sender<SurfaceEvent>,
}

async fn redirect_handler(
    State(s): State<Redirects>,
    OriginalUri(uri): OriginalUri,
) -> Html<&'static str> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let _ = s.tx.send(SurfaceEvent::Navigated(format!("{}{path}", s.origin))).await;
    Html(DONE_PAGE)
}

#[cfg(test)]
#[path = "loopback_tests.rs"]
mod tests;
