// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal notification surface: events to stdout, commands from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::LifecycleEvent;
use crate::registrar::AccountStatus;
use crate::surface::{Command, NotificationSurface};
use crate::token::epoch_ms;

pub const USAGE: &str = "commands: authenticate <account> | refresh <account> | status";

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSurface;

impl NotificationSurface for ConsoleSurface {
    fn notify(&self, account: &str, event: &LifecycleEvent) {
        println!("{}", render_event(account, event, epoch_ms()));
    }

    fn attention(&self, account: &str, message: &str) {
        eprintln!("[{account}] attention: {message}");
    }

    fn status(&self, accounts: &[AccountStatus]) {
        for line in render_status(accounts) {
            println!("{line}");
        }
    }
}

/// One line per event. Token values are never printed.
pub fn render_event(account: &str, event: &LifecycleEvent, now_ms: u64) -> String {
    let kind = event.kind();
    match event {
        LifecycleEvent::AuthenticateFailed(e) | LifecycleEvent::RefreshFailed(e) => {
            format!("[{account}] {kind}: {e} ({})", e.as_str())
        }
        LifecycleEvent::Token(t) => {
            format!("[{account}] {kind}: valid for {}s", t.remaining(now_ms).as_secs())
        }
        _ => format!("[{account}] {kind}"),
    }
}

pub fn render_status(accounts: &[AccountStatus]) -> Vec<String> {
    if accounts.is_empty() {
        return vec!["No accounts configured.".to_owned()];
    }
    let mut lines = vec![
        format!("{:<24} {:<10} {:<12} {}", "ACCOUNT", "STATE", "EXPIRES IN", "REFRESH"),
        "-".repeat(58),
    ];
    for a in accounts {
        let expires = a.expires_in_secs.map_or_else(|| "-".to_owned(), |s| format!("{s}s"));
        let refresh = if a.has_refresh_token { "yes" } else { "no" };
        lines.push(format!("{:<24} {:<10} {expires:<12} {refresh}", a.name, a.state.as_str()));
    }
    lines
}

/// Parse one operator line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let account = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments: {line}"));
    }
    match (verb, account) {
        ("authenticate" | "auth", Some(a)) => Ok(Command::Authenticate(a.to_owned())),
        ("refresh", Some(a)) => Ok(Command::Refresh(a.to_owned())),
        ("status", None) => Ok(Command::Status),
        ("authenticate" | "auth" | "refresh", None) => Err(format!("{verb} needs an account")),
        _ => Err(format!("unknown command: {line}")),
    }
}

/// Read commands from stdin until EOF or shutdown.
pub fn spawn_stdin_commands(
    tx: mpsc::Sender<Command>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(l)) => l,
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    debug!("stdin read failed: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(cmd) => {
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}\n{USAGE}"),
            }
        }
    })
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
