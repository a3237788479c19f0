// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-account token state machine.
//!
//! ```text
//! inactive --activate--> authenticating --ok--> active
//!                                       --err-> inactive
//! active --timer | refresh()--> refreshing --ok--> active (new timer)
//!                                          --err-> active (token kept, no timer)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::Authenticator;
use crate::client::AuthorizationSession;
use crate::error::AuthError;
use crate::event::{EventBus, EventKind, LifecycleEvent};
use crate::store::TokenStore;
use crate::token::{epoch_ms, LifecycleState, TokenRecord};

/// Lower bound on the delay before a scheduled refresh. Keeps providers that
/// issue lifetimes under the safety margin from driving a refresh loop.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(30);

/// Transition currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Authenticating,
    Refreshing,
}

/// Resets the phase to idle when the transition ends, however it ends.
struct PhaseGuard<'a>(&'a Mutex<Phase>);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = Phase::Idle;
    }
}

struct PendingRefresh {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns one account's token and keeps it fresh.
pub struct LifecycleManager {
    account: String,
    authenticator: Arc<dyn Authenticator>,
    store: Arc<dyn TokenStore>,
    token: RwLock<Option<TokenRecord>>,
    phase: Mutex<Phase>,
    timer: Mutex<Option<PendingRefresh>>,
    next_generation: AtomicU64,
    events: EventBus,
    shutdown: CancellationToken,
}

impl LifecycleManager {
    /// Build a manager holding whatever `store` has for the account.
    pub fn new(
        account: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn TokenStore>,
    ) -> Arc<Self> {
        let account = account.into();
        let token = store.load();
        let manager = Arc::new(Self {
            events: EventBus::new(account.clone()),
            account,
            authenticator,
            store,
            token: RwLock::new(token),
            phase: Mutex::new(Phase::Idle),
            timer: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });
        debug!(account = %manager.account, state = manager.state().as_str(), "manager loaded");
        manager
    }

    /// Bring a restored token up to date: refresh it if expired, otherwise
    /// schedule a refresh for its expiry.
    pub async fn start(self: &Arc<Self>) {
        let state = self.state();
        info!(account = %self.account, state = state.as_str(), "starting");
        match state {
            LifecycleState::Expired => {
                if let Err(e) = self.refresh().await {
                    warn!(account = %self.account, err = %e, "startup refresh failed");
                }
            }
            LifecycleState::Active => {
                let remaining = self.token().map(|t| t.remaining(epoch_ms())).unwrap_or_default();
                self.queue_refresh(remaining);
            }
            LifecycleState::Inactive => {}
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::classify(self.token.read().as_ref(), epoch_ms())
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn token(&self) -> Option<TokenRecord> {
        self.token.read().clone()
    }

    /// Whether a refresh timer is armed.
    pub fn refresh_pending(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Run the interactive flow if no token is held and nothing is in flight.
    pub async fn activate(self: &Arc<Self>) {
        let Some(_guard) = self.begin(Phase::Authenticating) else {
            debug!(account = %self.account, "activate ignored, transition in flight");
            return;
        };
        if self.token.read().is_some() {
            debug!(account = %self.account, "activate ignored, token held");
            return;
        }

        self.events.emit(LifecycleEvent::Authenticating);
        match self.authenticator.authenticate(AuthorizationSession::offline()).await {
            Ok(token) => {
                let token = self.secure_token(token);
                info!(account = %self.account, "authenticated");
                self.events.emit(LifecycleEvent::Authenticated(token));
            }
            Err(e) => {
                warn!(account = %self.account, err = %e, "authentication failed");
                self.events.emit(LifecycleEvent::AuthenticateFailed(e));
            }
        }
    }

    /// Exchange the held refresh token for a new access token.
    ///
    /// Fails only with [`AuthError::NoToken`]; exchange failures are reported
    /// as `refresh-failed` and leave the held token unchanged.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), AuthError> {
        if self.token.read().is_none() {
            error!(account = %self.account, "refresh requested without a token");
            return Err(AuthError::NoToken);
        }
        let Some(_guard) = self.begin(Phase::Refreshing) else {
            debug!(account = %self.account, "refresh ignored, transition in flight");
            return Ok(());
        };
        let Some(current) = self.token() else {
            return Err(AuthError::NoToken);
        };

        self.events.emit(LifecycleEvent::Refreshing);
        match self.authenticator.refresh(&current).await {
            Ok(token) => {
                let token = self.secure_token(token);
                info!(account = %self.account, "refreshed");
                self.events.emit(LifecycleEvent::Refreshed(token));
            }
            Err(e) => {
                warn!(account = %self.account, err = %e, "refresh failed, not rescheduling");
                self.events.emit(LifecycleEvent::RefreshFailed(e));
            }
        }
        Ok(())
    }

    /// Stamp, persist and hold `token`, then schedule its refresh.
    pub fn secure_token(self: &Arc<Self>, mut token: TokenRecord) -> TokenRecord {
        token.stamp_expiry(epoch_ms());
        if let Err(e) = self.store.save(&token) {
            error!(account = %self.account, err = %e, "failed to persist token");
        }
        *self.token.write() = Some(token.clone());
        self.events.emit(LifecycleEvent::Token(token.clone()));

        let delay = token.secured_lifetime().max(MIN_REFRESH_DELAY);
        self.queue_refresh(delay);
        token
    }

    /// Arm the refresh timer, replacing any pending one.
    pub fn queue_refresh(self: &Arc<Self>, delay: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        debug!(account = %self.account, delay_secs = delay.as_secs(), "refresh scheduled");

        // Hold the slot across the spawn: a zero delay must find its own entry.
        let mut slot = self.timer.lock();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            fire_refresh(weak, generation).await;
        });
        if let Some(previous) = slot.replace(PendingRefresh { generation, handle }) {
            previous.handle.abort();
        }
    }

    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&LifecycleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on(kind, handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Cancel the pending refresh and stop further timers.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(pending) = self.timer.lock().take() {
            pending.handle.abort();
        }
    }

    fn begin(&self, phase: Phase) -> Option<PhaseGuard<'_>> {
        let mut current = self.phase.lock();
        if *current != Phase::Idle {
            return None;
        }
        *current = phase;
        Some(PhaseGuard(&self.phase))
    }
}

/// Timer body: refresh unless the manager is gone or the timer was superseded.
async fn fire_refresh(weak: Weak<LifecycleManager>, generation: u64) {
    let Some(manager) = weak.upgrade() else {
        return;
    };
    {
        let mut slot = manager.timer.lock();
        if slot.as_ref().map(|p| p.generation) != Some(generation) {
            return;
        }
        // Detach our own handle so rescheduling does not abort us.
        slot.take();
    }
    debug!(account = %manager.account, "scheduled refresh due");
    if let Err(e) = manager.refresh().await {
        warn!(account = %manager.account, err = %e, "scheduled refresh skipped");
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
