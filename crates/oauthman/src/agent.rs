// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive half of the authorization-code flow: show the consent page,
//! wait for the provider's redirect, and turn it into a code.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::client::{AuthorizationSession, BoxFuture, TokenExchanger};
use crate::error::AuthError;
use crate::query;
use crate::surface::{SurfaceEvent, UiSurface};
use crate::token::TokenRecord;

/// Supplies a `state` for sessions that do not carry one.
pub trait StateHook: Send + Sync {
    fn generate(&self) -> Option<String>;
}

/// Generates nothing; the session goes out without `state`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStateHook;

impl StateHook for NoStateHook {
    fn generate(&self) -> Option<String> {
        None
    }
}

/// 32 random bytes, base64url without padding.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStateHook;

impl StateHook for RandomStateHook {
    fn generate(&self) -> Option<String> {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        Some(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// What the lifecycle manager drives to obtain and renew tokens.
pub trait Authenticator: Send + Sync {
    fn authenticate(
        &self,
        session: AuthorizationSession,
    ) -> BoxFuture<'_, Result<TokenRecord, AuthError>>;

    fn refresh<'a>(&'a self, token: &'a TokenRecord)
        -> BoxFuture<'a, Result<TokenRecord, AuthError>>;
}

/// Obtains codes through a [`UiSurface`] and exchanges them.
pub struct InteractiveAgent {
    exchanger: Arc<dyn TokenExchanger>,
    surface: Arc<dyn UiSurface>,
    redirect_uri: String,
    state_hook: Arc<dyn StateHook>,
}

impl InteractiveAgent {
    pub fn new(
        exchanger: Arc<dyn TokenExchanger>,
        surface: Arc<dyn UiSurface>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            exchanger,
            surface,
            redirect_uri: redirect_uri.into(),
            state_hook: Arc::new(NoStateHook),
        }
    }

    pub fn with_state_hook(mut self, hook: Arc<dyn StateHook>) -> Self {
        self.state_hook = hook;
        self
    }

    /// Run one interactive attempt and return the authorization code.
    ///
    /// Resolves exactly once; the surface is dismissed on every outcome.
    pub async fn obtain_code(
        &self,
        mut session: AuthorizationSession,
    ) -> Result<String, AuthError> {
        if session.state.is_none() {
            session.state = self.state_hook.generate();
        }
        let url = self.exchanger.authorization_url(&session);
        let mut surface = self.surface.open(&url).await?;

        let outcome = loop {
            match surface.events.recv().await {
                Some(SurfaceEvent::Navigated(location)) => {
                    if !location.starts_with(&self.redirect_uri) {
                        debug!("ignoring navigation outside redirect uri");
                        continue;
                    }
                    break resolve_redirect(&session, &location);
                }
                Some(SurfaceEvent::Closed) | None => {
                    break Err(AuthError::Aborted { state: session.state.clone() });
                }
            }
        };
        surface.dismiss.cancel();

        match outcome {
            Ok(_) => info!("authorization code received"),
            Err(ref e) => warn!(err = %e, "authorization attempt failed"),
        }
        outcome
    }
}

/// Turn a matching redirect into a code or the failure it describes.
fn resolve_redirect(session: &AuthorizationSession, location: &str) -> Result<String, AuthError> {
    let params = query::extract_query(location);
    let received = params.get("state");
    if received != session.state.as_deref() {
        return Err(AuthError::StateMismatch {
            expected: session.state.clone(),
            received: received.map(str::to_owned),
        });
    }
    if let Some(code) = params.get("code") {
        return Ok(code.to_owned());
    }
    if let Some(error) = params.get("error") {
        return Err(AuthError::ProviderDenied { error: error.to_owned() });
    }
    Err(AuthError::CodeNotFound)
}

impl Authenticator for InteractiveAgent {
    fn authenticate(
        &self,
        session: AuthorizationSession,
    ) -> BoxFuture<'_, Result<TokenRecord, AuthError>> {
        Box::pin(async move {
            let code = self.obtain_code(session).await?;
            self.exchanger.exchange_code(&code).await
        })
    }

    fn refresh<'a>(
        &'a self,
        token: &'a TokenRecord,
    ) -> BoxFuture<'a, Result<TokenRecord, AuthError>> {
        self.exchanger.refresh(token)
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
