//! Token acquisition, the shared credential store, and the background refresher
//!
//! One credential is current at any instant. Workers read it at
//! request-build time through [`TokenStore::bearer`]; the refresher task is
//! the only writer. The refresher is fail-stop: a failed renewal terminates
//! it, after which workers keep using the stale token until their requests
//! start failing with authorization errors.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AuthError;
use crate::types::Event;

/// A bearer credential obtained from the token endpoint
#[derive(Clone, Debug)]
pub struct Credential {
    /// Opaque access token sent as `Authorization: Bearer <token>`
    pub token: String,
    /// Token type reported by the endpoint (typically "Bearer")
    pub token_kind: String,
    /// Scope string reported by the endpoint
    pub scope: String,
    /// Validity window; the refresher renews `refresh_margin` before it ends
    pub valid_for: Duration,
}

/// Wire format of the token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_in: u64,
}

impl From<TokenResponse> for Credential {
    fn from(response: TokenResponse) -> Self {
        Self {
            token: response.access_token,
            token_kind: response.token_type,
            scope: response.scope,
            valid_for: Duration::from_secs(response.expires_in),
        }
    }
}

/// Shared credential cell: single writer (the refresher), many readers
///
/// Readers never hold the lock across an await point — [`bearer`] clones the
/// token string under a short read lock, so an in-progress replacement is
/// observed as either the old or the new credential, never a torn value.
///
/// [`bearer`]: TokenStore::bearer
pub struct TokenStore {
    current: RwLock<Credential>,
}

impl TokenStore {
    /// Create a store seeded with the credential from the initial exchange
    pub fn new(credential: Credential) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(credential),
        })
    }

    /// The current access token, for building an `Authorization` header
    ///
    /// Call this when building each request, not once per worker — tokens
    /// rotate mid-run.
    pub fn bearer(&self) -> String {
        self.read().token.clone()
    }

    /// A snapshot of the full current credential
    pub fn current(&self) -> Credential {
        self.read().clone()
    }

    /// Install a renewed credential (refresher only)
    pub(crate) fn replace(&self, credential: Credential) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = credential;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Credential> {
        // A poisoned lock only means a writer panicked mid-assignment of a
        // plain struct; the value is still usable.
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exchange client credentials for a bearer token
///
/// Sends `grant_type=client_credentials` with HTTP Basic authorization built
/// from the configured client id and secret.
///
/// # Errors
///
/// - [`AuthError::MissingCredentials`] if either the id or secret is empty
/// - [`AuthError::Network`] on transport failure
/// - [`AuthError::Status`] when the endpoint answers with a non-2xx status
/// - [`AuthError::MalformedResponse`] when the body cannot be parsed
pub async fn authenticate(
    client: &reqwest::Client,
    config: &Config,
) -> Result<Credential, AuthError> {
    let credentials = &config.credentials;
    if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let response = client
        .post(&config.endpoints.token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(AuthError::Network)?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Status { status });
    }

    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

    Ok(parsed.into())
}

/// Spawn the background token refresher
///
/// Sleeps until `refresh_margin` before the current credential expires,
/// re-authenticates, and installs the renewal. A failed renewal logs,
/// emits [`Event::TokenRefreshFailed`], and terminates the task (fail-stop).
/// The cancellation token stops the refresher deterministically when the
/// orchestrator finishes.
pub(crate) fn spawn_refresher(
    store: Arc<TokenStore>,
    client: reqwest::Client,
    config: Arc<Config>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = store
                .current()
                .valid_for
                .saturating_sub(config.refresh_margin);

            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::debug!("token refresher cancelled");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match authenticate(&client, &config).await {
                Ok(credential) => {
                    tracing::info!(
                        valid_for_secs = credential.valid_for.as_secs(),
                        "refreshed access token"
                    );
                    event_tx
                        .send(Event::TokenRefreshed {
                            valid_for: credential.valid_for,
                        })
                        .ok();
                    store.replace(credential);
                }
                Err(e) => {
                    tracing::error!(error = %e, "token refresh failed, refresher exiting");
                    event_tx
                        .send(Event::TokenRefreshFailed {
                            error: e.to_string(),
                        })
                        .ok();
                    break;
                }
            }
        }
    })
}
