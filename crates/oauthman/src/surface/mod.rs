// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator surfaces: where the user grants consent, and where the
//! process reports lifecycle events and receives commands.

pub mod console;
pub mod loopback;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::BoxFuture;
use crate::error::AuthError;
use crate::event::LifecycleEvent;
use crate::registrar::AccountStatus;

/// Something that happened on an open interactive surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The surface loaded `url` (for a loopback listener: it received a request).
    Navigated(String),
    /// The user closed the surface, or it timed out.
    Closed,
}

/// Handle to one open surface.
///
/// Dropping the receiver or cancelling `dismiss` tears the surface down.
pub struct SurfaceSession {
    pub events: mpsc::Receiver<SurfaceEvent>,
    pub dismiss: CancellationToken,
}

impl SurfaceSession {
    /// Channel pair for implementations: the sender feeds `events`.
    pub fn channel() -> (mpsc::Sender<SurfaceEvent>, Self) {
        let (tx, rx) = mpsc::channel(16);
        (tx, Self { events: rx, dismiss: CancellationToken::new() })
    }
}

/// Interactive surface capable of showing the provider's consent page.
pub trait UiSurface: Send + Sync {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<SurfaceSession, AuthError>>;
}

/// Operator command addressed to one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Authenticate(String),
    Refresh(String),
    Status,
}

/// Where lifecycle progress is shown to the operator.
pub trait NotificationSurface: Send + Sync {
    fn notify(&self, account: &str, event: &LifecycleEvent);

    /// Something needs a human (e.g. a refresh that will not be retried).
    fn attention(&self, account: &str, message: &str);

    fn status(&self, accounts: &[AccountStatus]);
}
