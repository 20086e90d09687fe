use std::io;
use std::path::Path;

use gdrive_core::{OAuthClient, OAuthError, OAuthToken};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::oauth_flow::{OAuthFlow, OAuthFlowError};
use crate::token_cache::{self, TokenCache};

const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
    #[error("authorization flow failed: {0}")]
    Flow(#[from] OAuthFlowError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("credential file is malformed: {0}")]
    MalformedCredentials(#[from] serde_json::Error),
    #[error(
        "no usable credentials: provide a token cache, client secrets, or fallback credentials"
    )]
    NoUsableCredentials,
}

/// Which rung of the fallback chain produced the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cache,
    Refreshed,
    InteractiveFlow,
    FallbackFile,
}

#[derive(Debug)]
pub struct ResolvedCredentials {
    pub access_token: String,
    pub source: CredentialSource,
}

/// Installed-app client secrets file, as downloaded from the API console.
#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: InstalledSecrets,
}

#[derive(Debug, Deserialize)]
struct InstalledSecrets {
    client_id: String,
    client_secret: String,
}

/// Pre-provisioned authorized-user credentials.
#[derive(Debug, Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

/// Resolves an access token through the fallback chain: cached token
/// (refreshed in place when stale), then the interactive installed-app flow,
/// then the pre-provisioned credentials file. Exhausting the chain is a hard
/// failure; nothing here retries.
pub async fn resolve_credentials(
    config: &RunConfig,
    token_base_url: Option<&str>,
) -> Result<ResolvedCredentials, AuthError> {
    if let Some(cache) = token_cache::load(&config.token_cache_path) {
        if !cache.is_expired(REFRESH_SKEW_SECS) {
            debug!("using cached access token");
            return Ok(ResolvedCredentials {
                access_token: cache.access_token,
                source: CredentialSource::Cache,
            });
        }
        if let Some(resolved) = refresh_cached(&cache, config, token_base_url).await {
            return Ok(resolved);
        }
    }

    if let Some(secrets) = read_json::<ClientSecrets>(&config.client_secrets_path)? {
        let client = oauth_client(
            &secrets.installed.client_id,
            &secrets.installed.client_secret,
            token_base_url,
        )?;
        let token = OAuthFlow::new(&client).authenticate().await?;
        store_cache(config, &token, &secrets.installed);
        return Ok(ResolvedCredentials {
            access_token: token.access_token,
            source: CredentialSource::InteractiveFlow,
        });
    }

    if let Some(user) = read_json::<AuthorizedUser>(&config.fallback_credentials_path)? {
        warn!("using default credentials");
        let client = oauth_client(&user.client_id, &user.client_secret, token_base_url)?;
        let token = client.refresh_token(&user.refresh_token).await?;
        return Ok(ResolvedCredentials {
            access_token: token.access_token,
            source: CredentialSource::FallbackFile,
        });
    }

    Err(AuthError::NoUsableCredentials)
}

/// Attempts to refresh a stale cached token. Any failure falls through to the
/// next rung of the chain rather than aborting the run.
async fn refresh_cached(
    cache: &TokenCache,
    config: &RunConfig,
    token_base_url: Option<&str>,
) -> Option<ResolvedCredentials> {
    let refresh_token = cache.refresh_token.as_deref()?;
    let (client_id, client_secret) = cache
        .client_id
        .as_deref()
        .zip(cache.client_secret.as_deref())?;
    let client = oauth_client(client_id, client_secret, token_base_url).ok()?;
    match client.refresh_token(refresh_token).await {
        Ok(token) => {
            let mut updated = TokenCache::from_oauth_token(
                &token,
                Some(client_id.to_string()),
                Some(client_secret.to_string()),
            );
            if updated.refresh_token.is_none() {
                updated.refresh_token = Some(refresh_token.to_string());
            }
            if let Err(err) = token_cache::store(&config.token_cache_path, &updated) {
                warn!("failed to persist refreshed token: {err}");
            }
            Some(ResolvedCredentials {
                access_token: updated.access_token,
                source: CredentialSource::Refreshed,
            })
        }
        Err(err) => {
            warn!("cached token refresh failed: {err}");
            None
        }
    }
}

fn store_cache(config: &RunConfig, token: &OAuthToken, secrets: &InstalledSecrets) {
    let cache = TokenCache::from_oauth_token(
        token,
        Some(secrets.client_id.clone()),
        Some(secrets.client_secret.clone()),
    );
    if let Err(err) = token_cache::store(&config.token_cache_path, &cache) {
        warn!("failed to persist token cache: {err}");
    }
}

fn oauth_client(
    client_id: &str,
    client_secret: &str,
    base_url: Option<&str>,
) -> Result<OAuthClient, OAuthError> {
    match base_url {
        Some(url) => OAuthClient::with_base_url(url, client_id, client_secret),
        None => OAuthClient::new(client_id, client_secret),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, AuthError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}
