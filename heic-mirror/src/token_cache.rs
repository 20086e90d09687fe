use std::fs;
use std::io;
use std::path::Path;

use gdrive_core::OAuthToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Versioned on-disk token cache.
///
/// Client id and secret ride along so a later run can refresh the access
/// token without re-reading the client secrets file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCache {
    pub version: u32,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl TokenCache {
    pub fn from_oauth_token(
        token: &OAuthToken,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            version: CACHE_VERSION,
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now_unix().saturating_add(secs as i64)),
            client_id,
            client_secret,
        }
    }

    /// A cache without an expiry timestamp never counts as expired.
    pub fn is_expired(&self, skew_secs: i64) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        expires_at <= now_unix().saturating_add(skew_secs)
    }
}

/// Loads the cache. Absent, unreadable, unparsable, or wrong-version content
/// all read as `None` so the caller falls through its credential chain.
pub fn load(path: &Path) -> Option<TokenCache> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!("unreadable token cache at {}: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_str::<TokenCache>(&raw) {
        Ok(cache) if cache.version == CACHE_VERSION => Some(cache),
        Ok(cache) => {
            warn!("ignoring token cache with unsupported version {}", cache.version);
            None
        }
        Err(err) => {
            warn!("ignoring malformed token cache at {}: {err}", path.display());
            None
        }
    }
}

pub fn store(path: &Path, cache: &TokenCache) -> Result<(), CacheError> {
    fs::write(path, serde_json::to_string_pretty(cache)?)?;
    Ok(())
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_cache() -> TokenCache {
        TokenCache {
            version: CACHE_VERSION,
            access_token: "token-1".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(i64::MAX),
            client_id: Some("client-id".into()),
            client_secret: Some("secret".into()),
        }
    }

    #[test]
    fn stores_and_reloads_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");

        store(&path, &sample_cache()).unwrap();
        let loaded = load(&path).expect("cache should load");

        assert_eq!(loaded.access_token, "token-1");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(loaded.client_id.as_deref(), Some("client-id"));
    }

    #[test]
    fn missing_cache_reads_as_none() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("token.json")).is_none());
    }

    #[test]
    fn unsupported_version_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        let mut cache = sample_cache();
        cache.version = CACHE_VERSION + 1;

        store(&path, &cache).unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn malformed_content_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");

        std::fs::write(&path, "not json at all").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn expiry_honours_skew() {
        let mut cache = sample_cache();
        cache.expires_at = Some(now_unix() + 30);

        assert!(cache.is_expired(60));
        assert!(!cache.is_expired(0));
    }

    #[test]
    fn cache_without_expiry_never_expires() {
        let mut cache = sample_cache();
        cache.expires_at = None;

        assert!(!cache.is_expired(60));
    }
}
