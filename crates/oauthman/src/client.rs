// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization-code protocol against a provider's authorization and token
//! endpoints. One request/response per call, no retries.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::AuthError;
use crate::query;
use crate::token::TokenRecord;

/// Boxed future returned by the exchange traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-account registration with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Provider endpoints and query defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub scope: Vec<String>,
    pub access_type: String,
    pub approval_prompt: String,
}

impl ProviderProfile {
    pub fn google() -> Self {
        Self {
            authorization_endpoint: "https://accounts.google.com/o/oauth2/auth".to_owned(),
            token_endpoint: "https://accounts.google.com/o/oauth2/token".to_owned(),
            scope: vec!["https://www.googleapis.com/auth/userinfo.email".to_owned()],
            access_type: "online".to_owned(),
            approval_prompt: "auto".to_owned(),
        }
    }
}

/// One interactive authorization attempt. Unset fields fall back to the
/// provider profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSession {
    pub state: Option<String>,
    pub scope: Option<Vec<String>>,
    pub access_type: Option<String>,
    pub approval_prompt: Option<String>,
}

impl AuthorizationSession {
    /// Session requesting offline access (a refresh token).
    pub fn offline() -> Self {
        Self { access_type: Some("offline".to_owned()), ..Self::default() }
    }
}

/// The provider-facing half of the flow.
pub trait TokenExchanger: Send + Sync {
    /// URL the user must visit to grant consent.
    fn authorization_url(&self, session: &AuthorizationSession) -> String;

    /// Trade an authorization code for a token record.
    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<TokenRecord, AuthError>>;

    /// Obtain a fresh access token, merging the response into `existing`.
    fn refresh<'a>(
        &'a self,
        existing: &'a TokenRecord,
    ) -> BoxFuture<'a, Result<TokenRecord, AuthError>>;
}

/// HTTP implementation of [`TokenExchanger`].
pub struct AuthClient {
    config: ClientConfig,
    profile: ProviderProfile,
    http: reqwest::Client,
}

impl AuthClient {
    pub fn new(config: ClientConfig, profile: ProviderProfile) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(TOKEN_TIMEOUT).build()?;
        Ok(Self { config, profile, http })
    }

    async fn post_token(
        &self,
        form: &[(&str, &str)],
    ) -> Result<serde_json::Map<String, serde_json::Value>, AuthError> {
        let resp = self.http.post(&self.profile.token_endpoint).form(form).send().await?;

        let status = resp.status();
        debug!(
            endpoint = %self.profile.token_endpoint,
            status = status.as_u16(),
            headers = ?resp.headers(),
            "token endpoint response"
        );
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}

impl TokenExchanger for AuthClient {
    fn authorization_url(&self, session: &AuthorizationSession) -> String {
        let scope = session.scope.as_ref().unwrap_or(&self.profile.scope).join(" ");
        let access_type = session.access_type.as_deref().unwrap_or(&self.profile.access_type);
        let approval_prompt =
            session.approval_prompt.as_deref().unwrap_or(&self.profile.approval_prompt);

        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("access_type", access_type),
            ("approval_prompt", approval_prompt),
        ];
        if let Some(ref state) = session.state {
            params.push(("state", state.as_str()));
        }
        format!("{}?{}", self.profile.authorization_endpoint, query::encode(&params))
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<TokenRecord, AuthError>> {
        Box::pin(async move {
            let body = self
                .post_token(&[
                    ("code", code),
                    ("client_id", &self.config.client_id),
                    ("client_secret", &self.config.client_secret),
                    ("redirect_uri", &self.config.redirect_uri),
                    ("grant_type", "authorization_code"),
                ])
                .await?;
            TokenRecord::from_response(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
        })
    }

    fn refresh<'a>(
        &'a self,
        existing: &'a TokenRecord,
    ) -> BoxFuture<'a, Result<TokenRecord, AuthError>> {
        Box::pin(async move {
            let refresh_token =
                existing.refresh_token.as_deref().ok_or(AuthError::MissingRefreshToken)?;
            let body = self
                .post_token(&[
                    ("refresh_token", refresh_token),
                    ("client_id", &self.config.client_id),
                    ("client_secret", &self.config.client_secret),
                    ("grant_type", "refresh_token"),
                ])
                .await?;
            existing.merged(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
        })
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
