use std::io::Write;
use std::time::Duration;

use gdrive_core::{OAuthClient, OAuthError, OAuthToken};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const MANUAL_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Full-access Drive scope; the tool both reads the tree and token metadata.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("authorization timed out")]
    Timeout,
}

/// Interactive installed-app authorization.
///
/// Preferred path is a loopback redirect: bind an ephemeral local port, hand
/// the user the authorization URL, and read the code off the redirect
/// request. When the loopback leg fails the flow degrades to manual code
/// entry on the terminal.
pub struct OAuthFlow<'a> {
    client: &'a OAuthClient,
}

impl<'a> OAuthFlow<'a> {
    pub fn new(client: &'a OAuthClient) -> Self {
        Self { client }
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        match self.authenticate_via_loopback().await {
            Ok(token) => Ok(token),
            Err(err) => {
                tracing::warn!(
                    "loopback authorization unavailable ({err}), falling back to manual code entry"
                );
                let code = prompt_verification_code(self.client.client_id())?;
                Ok(self
                    .client
                    .exchange_code(&code, Some(MANUAL_REDIRECT_URI))
                    .await?)
            }
        }
    }

    async fn authenticate_via_loopback(&self) -> Result<OAuthToken, OAuthFlowError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", addr.port());
        let url = authorize_url(self.client.client_id(), &redirect_uri);
        println!("Open this URL in your browser:\n{url}");

        let (mut stream, _) = tokio::time::timeout(oauth_timeout(), listener.accept())
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;

        let mut request = vec![0u8; 8192];
        let read = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut request))
            .await
            .map_err(|_| OAuthFlowError::Timeout)??;
        let request_text = String::from_utf8_lossy(&request[..read]);
        let code =
            extract_code_from_http_request(&request_text).ok_or(OAuthFlowError::MissingCode)?;

        let _ = stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
                <html><body><h2>Google Drive connected</h2><p>You can return to the terminal.</p></body></html>",
            )
            .await;
        let _ = stream.shutdown().await;

        Ok(self.client.exchange_code(&code, Some(&redirect_uri)).await?)
    }
}

fn prompt_verification_code(client_id: &str) -> Result<String, OAuthFlowError> {
    let url = authorize_url(client_id, MANUAL_REDIRECT_URI);
    println!("Open this URL in your browser:\n{url}");
    print!("Enter the verification code: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let code = input.trim().to_string();
    if code.is_empty() {
        return Err(OAuthFlowError::MissingCode);
    }
    Ok(code)
}

fn authorize_url(client_id: &str, redirect_uri: &str) -> Url {
    let mut url = Url::parse(AUTHORIZE_URL).expect("hardcoded OAuth URL is valid");
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", DRIVE_SCOPE);
        // Offline access so the token endpoint hands back a refresh token.
        query.append_pair("access_type", "offline");
    }
    url
}

fn extract_code_from_http_request(request: &str) -> Option<String> {
    let request_line = request.lines().next()?;
    let target = request_line.split_whitespace().nth(1)?;
    let request_url = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target).ok()?
    } else {
        Url::parse(&format!("http://127.0.0.1{target}")).ok()?
    };
    request_url
        .query_pairs()
        .find_map(|(key, value)| (key == "code" && !value.is_empty()).then(|| value.into_owned()))
}

fn oauth_timeout() -> Duration {
    let secs = std::env::var("HEIC_MIRROR_OAUTH_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(180);
    Duration::from_secs(secs)
}
