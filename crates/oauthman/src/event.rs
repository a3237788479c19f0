// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::error::AuthError;
use crate::token::TokenRecord;

/// Lifecycle notification for one account, in transition order.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Authenticating,
    Authenticated(TokenRecord),
    AuthenticateFailed(AuthError),
    Refreshing,
    Refreshed(TokenRecord),
    RefreshFailed(AuthError),
    /// A token was secured (after authenticate or refresh).
    Token(TokenRecord),
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Authenticating => EventKind::Authenticating,
            Self::Authenticated(_) => EventKind::Authenticated,
            Self::AuthenticateFailed(_) => EventKind::AuthenticateFailed,
            Self::Refreshing => EventKind::Refreshing,
            Self::Refreshed(_) => EventKind::Refreshed,
            Self::RefreshFailed(_) => EventKind::RefreshFailed,
            Self::Token(_) => EventKind::Token,
        }
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::AuthenticateFailed(e) | Self::RefreshFailed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Authenticating,
    Authenticated,
    AuthenticateFailed,
    Refreshing,
    Refreshed,
    RefreshFailed,
    Token,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::AuthenticateFailed => "authenticate-failed",
            Self::Refreshing => "refreshing",
            Self::Refreshed => "refreshed",
            Self::RefreshFailed => "refresh-failed",
            Self::Token => "token",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous handler registered for one event kind.
pub type Listener = Arc<dyn Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync>;

/// Per-account publish/subscribe.
///
/// Listeners run first, in registration order, on the emitting task. A
/// listener that errors or panics is logged and does not affect the others.
/// The event is then broadcast to subscribers.
pub struct EventBus {
    account: String,
    tx: broadcast::Sender<LifecycleEvent>,
    listeners: RwLock<Vec<(EventKind, Listener)>>,
}

impl EventBus {
    pub fn new(account: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { account: account.into(), tx, listeners: RwLock::new(Vec::new()) }
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.write().push((kind, Arc::new(handler)));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        let kind = event.kind();
        // Snapshot so a handler may register further listeners.
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in matching {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        account = %self.account,
                        event = kind.as_str(),
                        err = %e,
                        "listener failed"
                    );
                }
                Err(_) => {
                    error!(account = %self.account, event = kind.as_str(), "listener panicked");
                }
            }
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
