// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! oauthman: keeps OAuth2 authorization-code tokens fresh for named accounts.

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod query;
pub mod registrar;
pub mod store;
pub mod surface;
pub mod test_support;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{NoStateHook, RandomStateHook, StateHook};
use crate::config::{AccountConfig, Config};
use crate::error::AuthError;
use crate::registrar::{AccountStatus, Registrar, Wiring};
use crate::store::{FileTokenStore, TokenStore};
use crate::surface::console::{spawn_stdin_commands, ConsoleSurface, USAGE};
use crate::surface::loopback::LoopbackSurface;
use crate::surface::{NotificationSurface, UiSurface};

/// Manage every configured account until interrupted.
pub async fn run(config: &Config, accounts: IndexMap<String, AccountConfig>) -> anyhow::Result<()> {
    let token_dir = config.token_dir();
    std::fs::create_dir_all(&token_dir)
        .map_err(|e| anyhow::anyhow!("create {}: {e}", token_dir.display()))?;
    if accounts.is_empty() {
        warn!(clients = %config.clients_path().display(), "no accounts configured");
    }

    let state_hook: Arc<dyn StateHook> =
        if config.generate_state { Arc::new(RandomStateHook) } else { Arc::new(NoStateHook) };
    let timeout = config.redirect_timeout();
    let wiring = Wiring {
        token_dir,
        surface_for: Box::new(move |account: &AccountConfig| loopback_surface(account, timeout)),
        state_hook,
    };
    let notifier: Arc<dyn NotificationSurface> = Arc::new(ConsoleSurface);
    let registrar = Registrar::from_config(&accounts, &wiring, Arc::clone(&notifier))?;

    info!(accounts = accounts.len(), "oauthman started");
    registrar.start().await;
    notifier.status(&registrar.status());
    eprintln!("{USAGE}");

    let shutdown = CancellationToken::new();
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let reader = spawn_stdin_commands(cmd_tx, shutdown.clone());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received");
                    shutdown.cancel();
                }
                Err(e) => warn!("failed to listen for interrupt: {e}"),
            }
        });
    }

    registrar.run(cmd_rx, shutdown).await;
    registrar.shutdown();
    reader.abort();
    Ok(())
}

fn loopback_surface(
    account: &AccountConfig,
    timeout: Duration,
) -> Result<Arc<dyn UiSurface>, AuthError> {
    let surface = LoopbackSurface::new(&account.redirect_uri, timeout)?;
    Ok(Arc::new(surface))
}

/// Print what is stored for every configured account. No network.
pub fn status(config: &Config, accounts: &IndexMap<String, AccountConfig>) -> anyhow::Result<()> {
    let token_dir = config.token_dir();
    let now = token::epoch_ms();
    let statuses: Vec<AccountStatus> = accounts
        .keys()
        .map(|name| {
            let token = FileTokenStore::for_account(&token_dir, name).load();
            AccountStatus::new(name, token.as_ref(), now)
        })
        .collect();
    ConsoleSurface.status(&statuses);
    Ok(())
}
