// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::client::{ClientConfig, ProviderProfile};

/// OAuth2 token lifecycle manager.
#[derive(Debug, Parser)]
#[command(name = "oauthman", version, about)]
pub struct Config {
    /// Clients file (JSON object of account name to client registration).
    #[arg(long, global = true, env = "OAUTHMAN_CLIENTS")]
    pub clients: Option<PathBuf>,

    /// Directory holding the clients file and stored tokens.
    #[arg(long, global = true, env = "OAUTHMAN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Seconds to wait for the provider redirect before giving up.
    #[arg(long, global = true, env = "OAUTHMAN_REDIRECT_TIMEOUT_SECS", default_value_t = 300)]
    pub redirect_timeout_secs: u64,

    /// Send a random `state` with every authorization request.
    #[arg(long, global = true)]
    pub generate_state: bool,

    /// Log format (json or text).
    #[arg(long, global = true, env = "OAUTHMAN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "OAUTHMAN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Mode {
    /// Keep every account's token fresh and accept commands on stdin (default).
    Run,
    /// Print the stored state of every account and exit.
    Status,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.redirect_timeout_secs == 0 {
            anyhow::bail!("--redirect-timeout-secs must be greater than zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or(Mode::Run)
    }

    /// `--state-dir`, else `$HOME/.oauthman`, else `.oauthman`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".oauthman");
        }
        PathBuf::from(".oauthman")
    }

    /// Per-account token files live here.
    pub fn token_dir(&self) -> PathBuf {
        self.state_dir().join("google")
    }

    pub fn clients_path(&self) -> PathBuf {
        self.clients.clone().unwrap_or_else(|| self.state_dir().join("clients.json"))
    }

    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }
}

/// One entry of the clients file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountConfig {
    #[serde(alias = "id")]
    pub client_id: String,
    #[serde(alias = "secret")]
    pub client_secret: String,
    pub redirect_uri: String,
    /// Overrides the provider's default scope list.
    #[serde(default)]
    pub scope: Option<Vec<String>>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

impl AccountConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }

    /// Google profile with this account's overrides applied.
    pub fn profile(&self) -> ProviderProfile {
        let mut profile = ProviderProfile::google();
        if let Some(ref scope) = self.scope {
            profile.scope = scope.clone();
        }
        if let Some(ref url) = self.authorization_endpoint {
            profile.authorization_endpoint = url.clone();
        }
        if let Some(ref url) = self.token_endpoint {
            profile.token_endpoint = url.clone();
        }
        profile
    }
}

/// Load the clients file, keeping account order.
pub fn load_clients(path: &Path) -> anyhow::Result<IndexMap<String, AccountConfig>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read clients file {}: {e}", path.display()))?;
    let accounts: IndexMap<String, AccountConfig> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("parse clients file {}: {e}", path.display()))?;
    for name in accounts.keys() {
        validate_account_name(name)?;
    }
    Ok(accounts)
}

/// Account names become file names.
fn validate_account_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        anyhow::bail!("invalid account name: {name:?}");
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
