// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires one lifecycle manager per configured account and connects them to
//! the notification surface.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{InteractiveAgent, StateHook};
use crate::client::{AuthClient, TokenExchanger};
use crate::config::AccountConfig;
use crate::error::AuthError;
use crate::event::{EventKind, LifecycleEvent};
use crate::lifecycle::LifecycleManager;
use crate::store::{FileTokenStore, TokenStore};
use crate::surface::{Command, NotificationSurface, UiSurface};
use crate::token::{epoch_ms, LifecycleState, TokenRecord};

/// Snapshot of one account for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub name: String,
    pub state: LifecycleState,
    /// Seconds until `expires_at`; `None` without a token.
    pub expires_in_secs: Option<u64>,
    pub has_refresh_token: bool,
}

impl AccountStatus {
    pub fn new(name: &str, token: Option<&TokenRecord>, now_ms: u64) -> Self {
        Self {
            name: name.to_owned(),
            state: LifecycleState::classify(token, now_ms),
            expires_in_secs: token.map(|t| t.remaining(now_ms).as_secs()),
            has_refresh_token: token.is_some_and(|t| t.refresh_token.is_some()),
        }
    }

    pub fn of(manager: &LifecycleManager) -> Self {
        Self::new(manager.account(), manager.token().as_ref(), epoch_ms())
    }
}

/// Builds the interactive surface for one account.
pub type SurfaceFactory =
    Box<dyn Fn(&AccountConfig) -> Result<Arc<dyn UiSurface>, AuthError> + Send + Sync>;

/// Everything an account needs besides its own configuration.
pub struct Wiring {
    pub token_dir: PathBuf,
    pub surface_for: SurfaceFactory,
    pub state_hook: Arc<dyn StateHook>,
}

/// Owns the managers of all configured accounts, in configuration order.
pub struct Registrar {
    accounts: IndexMap<String, Arc<LifecycleManager>>,
    notifier: Arc<dyn NotificationSurface>,
    shutdown: CancellationToken,
}

impl Registrar {
    pub fn new(notifier: Arc<dyn NotificationSurface>) -> Self {
        Self { accounts: IndexMap::new(), notifier, shutdown: CancellationToken::new() }
    }

    /// Build the full per-account stack: HTTP client, agent, file store, manager.
    pub fn from_config(
        accounts: &IndexMap<String, AccountConfig>,
        wiring: &Wiring,
        notifier: Arc<dyn NotificationSurface>,
    ) -> Result<Self, AuthError> {
        let mut registrar = Self::new(notifier);
        for (name, account) in accounts {
            let client = AuthClient::new(account.client_config(), account.profile())?;
            let agent = InteractiveAgent::new(
                Arc::new(client) as Arc<dyn TokenExchanger>,
                (wiring.surface_for)(account)?,
                account.redirect_uri.clone(),
            )
            .with_state_hook(Arc::clone(&wiring.state_hook));
            let store = FileTokenStore::for_account(&wiring.token_dir, name);
            debug!(account = %name, path = %store.path().display(), "token store");
            let store: Arc<dyn TokenStore> = Arc::new(store);
            let manager = LifecycleManager::new(name.clone(), Arc::new(agent), store);
            registrar.register(manager);
        }
        Ok(registrar)
    }

    /// Add `manager`, wiring its failure listeners and event bridge.
    pub fn register(&mut self, manager: Arc<LifecycleManager>) {
        let name = manager.account().to_owned();

        manager.on(EventKind::AuthenticateFailed, {
            let name = name.clone();
            move |event| {
                if let Some(e) = event.error() {
                    warn!(account = %name, err = %e, "authenticate-failed");
                }
                Ok(())
            }
        });
        manager.on(EventKind::RefreshFailed, {
            let name = name.clone();
            let notifier = Arc::clone(&self.notifier);
            move |event| {
                if let Some(e) = event.error() {
                    notifier.attention(
                        &name,
                        &format!(
                            "refresh failed ({e}); it will not be retried, run `refresh {name}`"
                        ),
                    );
                }
                Ok(())
            }
        });

        spawn_bridge(
            name.clone(),
            manager.subscribe(),
            Arc::clone(&self.notifier),
            self.shutdown.clone(),
        );
        self.accounts.insert(name, manager);
    }

    pub fn manager(&self, name: &str) -> Option<&Arc<LifecycleManager>> {
        self.accounts.get(name)
    }

    /// Start every manager concurrently and wait until each has settled.
    pub async fn start(&self) {
        let mut set = JoinSet::new();
        for manager in self.accounts.values() {
            let manager = Arc::clone(manager);
            set.spawn(async move { manager.start().await });
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!("account start task failed: {e}");
            }
        }
    }

    pub fn status(&self) -> Vec<AccountStatus> {
        self.accounts.values().map(|m| AccountStatus::of(m)).collect()
    }

    /// Route one operator command. Transitions run in the background.
    pub fn dispatch(&self, command: Command) {
        let (name, authenticate) = match command {
            Command::Status => {
                self.notifier.status(&self.status());
                return;
            }
            Command::Authenticate(name) => (name, true),
            Command::Refresh(name) => (name, false),
        };
        let Some(manager) = self.accounts.get(&name) else {
            warn!(account = %name, "command for unknown account");
            self.notifier.attention(&name, "unknown account");
            return;
        };

        if authenticate && manager.token().is_some() {
            self.notifier.attention(&name, "already holding a token, use refresh");
            return;
        }

        let manager = Arc::clone(manager);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if authenticate {
                manager.activate().await;
            } else if let Err(e) = manager.refresh().await {
                notifier.attention(&name, &format!("{e}; authenticate first"));
            }
        });
    }

    /// Dispatch commands until shutdown. Accounts keep running after the
    /// command channel closes.
    pub async fn run(&self, mut commands: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.dispatch(cmd),
                    None => {
                        shutdown.cancelled().await;
                        break;
                    }
                },
            }
        }
    }

    pub fn shutdown(&self) {
        info!(accounts = self.accounts.len(), "shutting down");
        self.shutdown.cancel();
        for manager in self.accounts.values() {
            manager.shutdown();
        }
    }
}

/// Forward every event of one account to the notification surface.
fn spawn_bridge(
    name: String,
    mut rx: broadcast::Receiver<LifecycleEvent>,
    notifier: Arc<dyn NotificationSurface>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(event) => notifier.notify(&name, &event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(account = %name, skipped = n, "event bridge lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
#[path = "registrar_tests.rs"]
mod tests;
