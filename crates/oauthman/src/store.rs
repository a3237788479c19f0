// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token persistence: one JSON file per account, written atomically.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::token::TokenRecord;

/// Durable storage for a single account's token record.
///
/// Loading never fails: a missing or unreadable record is "no token".
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<TokenRecord>;

    fn save(&self, record: &TokenRecord) -> Result<(), AuthError>;
}

/// Stores the record as pretty-printed JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `account` inside `dir` (`<dir>/<account>.json`).
    pub fn for_account(dir: &Path, account: &str) -> Self {
        Self::new(dir.join(format!("{account}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<TokenRecord> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %self.path.display(), "no stored token: {e}");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.path.display(), "failed to parse stored token: {e}");
                None
            }
        }
    }

    /// Write to a unique temp file, then rename over the target.
    fn save(&self, record: &TokenRecord) -> Result<(), AuthError> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| AuthError::Persistence(format!("serialize: {e}")))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Persistence(format!("create {}: {e}", parent.display()))
            })?;
        }

        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, json)
            .map_err(|e| AuthError::Persistence(format!("write {}: {e}", tmp_path.display())))?;
        restrict_permissions(&tmp_path);
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            AuthError::Persistence(format!("rename to {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "token saved");
        Ok(())
    }
}

/// Owner read/write only; the file holds a refresh token.
#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), "failed to restrict token file permissions: {e}");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// In-memory store, records every save. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    current: Mutex<Option<TokenRecord>>,
    saves: Mutex<Vec<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `record` already stored.
    pub fn with_record(record: TokenRecord) -> Self {
        Self { current: Mutex::new(Some(record)), saves: Mutex::new(Vec::new()) }
    }

    /// Every record passed to `save`, oldest first.
    pub fn saves(&self) -> Vec<TokenRecord> {
        self.saves.lock().clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenRecord> {
        self.current.lock().clone()
    }

    fn save(&self, record: &TokenRecord) -> Result<(), AuthError> {
        *self.current.lock() = Some(record.clone());
        self.saves.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
