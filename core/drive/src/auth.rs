//! OAuth2 credential lifecycle for Google Drive.
//!
//! Decides whether the stored credential is reused, refreshed, or replaced
//! through the browser-based authorization flow, and persists the outcome
//! after every creation or refresh.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

use drivecli_common::{Error, Result};

use crate::store::CredentialStore;

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Drive scope requested during authorization.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Default credential file, one serialized record.
pub const CREDENTIALS_FILE: &str = "token.json";
/// Default OAuth2 client secrets file (Google "installed app" shape).
pub const CLIENT_SECRETS_FILE: &str = "client_secrets.json";

/// Persisted authorization record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API requests.
    pub access_token: String,
    /// Refresh token, when the service granted offline access.
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// Set once the record came out of a completed authorization or refresh.
    pub valid: bool,
}

impl Credential {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        // Considered expired with less than five minutes remaining.
        self.expires_at < Utc::now() + Duration::minutes(5)
    }
}

/// OAuth2 client settings read from the client secrets file.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Google wraps installed-app secrets in an `installed` object.
#[derive(Debug, Deserialize)]
struct SecretsFile {
    installed: AuthConfig,
}

impl AuthConfig {
    /// Load client settings from a secrets file.
    ///
    /// The file is a required input to the authorization flow; its absence
    /// is a startup error, raised before any network activity.
    pub fn from_secrets_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Auth(format!(
                "Client secrets file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let secrets: SecretsFile = serde_json::from_str(&data)
            .map_err(|e| Error::Serialization(format!("Malformed client secrets file: {}", e)))?;
        Ok(secrets.installed)
    }
}

/// OAuth2 client wrapper for the authorization, exchange, and refresh calls.
pub struct AuthManager {
    client: BasicClient,
}

impl AuthManager {
    /// Create a new authentication manager from client settings.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            Some(
                TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            ),
        );

        Ok(Self { client })
    }

    /// Refresh an expired access token in place.
    ///
    /// Services may omit a new refresh token from the response; the old one
    /// is retained in that case.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::Auth("No refresh token available".to_string()))?;

        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| Error::Auth(format!("Token refresh failed: {}", e)))?;

        Ok(credential_from_token(
            &token,
            credential.refresh_token.clone(),
        ))
    }

    /// Run the browser-based authorization-code flow and return a fresh
    /// credential.
    ///
    /// Opens a one-shot loopback listener for the redirect, launches the
    /// browser (printing the URL as a fallback), verifies the CSRF state,
    /// and exchanges the authorization code. Blocks until the redirect
    /// arrives.
    pub async fn run_interactive_flow(&self) -> Result<Credential> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| Error::Auth(format!("Failed to open callback listener: {}", e)))?;
        let port = listener.local_addr()?.port();
        let redirect = RedirectUrl::new(format!("http://127.0.0.1:{}", port))
            .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?;

        let client = self.client.clone().set_redirect_uri(redirect);
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(DRIVE_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        println!("Opening browser for authorization...");
        if open::that(auth_url.as_str()).is_err() {
            println!("Could not open a browser. Visit this URL to authorize:");
            println!("{}", auth_url);
        }

        let (code, state) = wait_for_callback(&listener).await?;
        if state != *csrf_token.secret() {
            return Err(Error::Auth("Authorization state mismatch".to_string()));
        }

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| Error::Auth(format!("Token exchange failed: {}", e)))?;

        let credential = credential_from_token(&token, None);
        if credential.refresh_token.is_none() {
            warn!("authorization granted no refresh token; next expiry forces a new flow");
        }
        Ok(credential)
    }
}

/// Build a credential from a token endpoint response.
fn credential_from_token(
    token: &BasicTokenResponse,
    fallback_refresh: Option<String>,
) -> Credential {
    let expires_in = token
        .expires_in()
        .unwrap_or_else(|| std::time::Duration::from_secs(3600));
    let expires_at =
        Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

    Credential {
        access_token: token.access_token().secret().clone(),
        refresh_token: token
            .refresh_token()
            .map(|t| t.secret().clone())
            .or(fallback_refresh),
        expires_at,
        valid: true,
    }
}

/// Accept a single redirect on the listener and extract the authorization
/// code and CSRF state from its query.
async fn wait_for_callback(listener: &TcpListener) -> Result<(String, String)> {
    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| Error::Auth(format!("Callback listener failed: {}", e)))?;

    let mut buf = vec![0u8; 4096];
    let read = stream
        .read(&mut buf)
        .await
        .map_err(|e| Error::Auth(format!("Failed to read callback request: {}", e)))?;
    let request = String::from_utf8_lossy(&buf[..read]);

    let result = parse_callback(&request);

    let body = match &result {
        Ok(_) => "Authorization complete. You can close this window.",
        Err(_) => "Authorization failed. You can close this window.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;

    result
}

/// Parse the redirect request line into (code, state).
fn parse_callback(request: &str) -> Result<(String, String)> {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| Error::Auth("Malformed callback request".to_string()))?;
    let url = Url::parse(&format!("http://127.0.0.1{}", path))
        .map_err(|e| Error::Auth(format!("Malformed callback request: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(Error::Auth(format!("Authorization denied: {}", value))),
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok((code, state)),
        _ => Err(Error::Auth(
            "Callback missing authorization code".to_string(),
        )),
    }
}

/// What the lifecycle policy decided to do with the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthAction {
    /// Stored credential is good; hand it back unchanged.
    Reuse,
    /// Expired with refresh capability; refresh in place.
    Refresh,
    /// Nothing usable; run the interactive flow.
    Reauthorize,
    /// Present and unexpired but never validated; refuse to proceed.
    Reject,
}

/// Lifecycle policy over the loaded record.
///
/// Expiry is checked before the validity flag: an expired record with a
/// refresh token is refreshable regardless of its flag, while an unexpired
/// record that was never marked valid is rejected outright rather than
/// silently used.
fn next_action(stored: Option<&Credential>) -> AuthAction {
    match stored {
        None => AuthAction::Reauthorize,
        Some(credential) if credential.is_expired() => {
            if credential.refresh_token.is_some() {
                AuthAction::Refresh
            } else {
                AuthAction::Reauthorize
            }
        }
        Some(credential) if !credential.valid => AuthAction::Reject,
        Some(_) => AuthAction::Reuse,
    }
}

/// Owns the credential store and the authorization trigger, and decides
/// whether to reuse, refresh, or re-acquire the stored credential.
pub struct CredentialManager {
    store: CredentialStore,
    auth: AuthManager,
}

impl CredentialManager {
    pub fn new(store: CredentialStore, auth: AuthManager) -> Self {
        Self { store, auth }
    }

    /// Return a valid credential, refreshing or re-authorizing as needed.
    ///
    /// A corrupt store is recovered by re-authorization. An unexpired record
    /// that was never marked valid is an error. Every created or refreshed
    /// credential is persisted before it is returned.
    pub async fn authenticate(&self) -> Result<Credential> {
        let stored = if self.store.exists() {
            match self.store.load() {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!("stored credential is unusable, requesting new authorization: {}", e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(stored) = stored {
            match next_action(Some(&stored)) {
                AuthAction::Reuse => {
                    info!("reusing stored credential");
                    return Ok(stored);
                }
                AuthAction::Reject => {
                    return Err(Error::Auth(
                        "Stored credential was never validated".to_string(),
                    ));
                }
                AuthAction::Refresh => {
                    info!("access token expired, refreshing");
                    match self.auth.refresh(&stored).await {
                        Ok(refreshed) => {
                            self.store.save(&refreshed)?;
                            return Ok(refreshed);
                        }
                        Err(e) => {
                            warn!("token refresh failed, requesting new authorization: {}", e);
                        }
                    }
                }
                AuthAction::Reauthorize => {
                    warn!("stored credential is expired and cannot be refreshed");
                }
            }
        }

        let credential = self.auth.run_interactive_flow().await?;
        self.store.save(&credential)?;
        info!("authorization flow complete");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expired: bool, refresh: bool, valid: bool) -> Credential {
        let expires_at = if expired {
            Utc::now() - Duration::hours(1)
        } else {
            Utc::now() + Duration::hours(1)
        };
        Credential {
            access_token: "access".to_string(),
            refresh_token: refresh.then(|| "refresh".to_string()),
            expires_at,
            valid,
        }
    }

    #[test]
    fn test_credential_expiration() {
        assert!(credential(true, true, true).is_expired());
        assert!(!credential(false, true, true).is_expired());
    }

    #[test]
    fn test_credential_near_expiration() {
        // Expiring in four minutes falls inside the five-minute leeway.
        let almost = Credential {
            access_token: "access".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::minutes(4),
            valid: true,
        };
        assert!(almost.is_expired());
    }

    #[test]
    fn test_valid_unexpired_credential_is_reused() {
        let stored = credential(false, true, true);
        assert_eq!(next_action(Some(&stored)), AuthAction::Reuse);
    }

    #[test]
    fn test_expired_with_refresh_token_is_refreshed() {
        let stored = credential(true, true, true);
        assert_eq!(next_action(Some(&stored)), AuthAction::Refresh);

        // Refreshability wins over the validity flag once expired.
        let stale = credential(true, true, false);
        assert_eq!(next_action(Some(&stale)), AuthAction::Refresh);
    }

    #[test]
    fn test_expired_without_refresh_token_reauthorizes() {
        let stored = credential(true, false, true);
        assert_eq!(next_action(Some(&stored)), AuthAction::Reauthorize);
    }

    #[test]
    fn test_missing_credential_reauthorizes() {
        assert_eq!(next_action(None), AuthAction::Reauthorize);
    }

    #[test]
    fn test_unexpired_invalid_credential_is_rejected() {
        let stored = credential(false, true, false);
        assert_eq!(next_action(Some(&stored)), AuthAction::Reject);
    }

    #[test]
    fn test_credential_serialization_round_trip() {
        let original = credential(false, true, true);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: Credential = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.access_token, original.access_token);
        assert_eq!(parsed.refresh_token, original.refresh_token);
        assert_eq!(parsed.valid, original.valid);
    }

    #[test]
    fn test_parse_callback_extracts_code_and_state() {
        let request = "GET /?state=xyzzy&code=4%2FabcDEF HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n";
        let (code, state) = parse_callback(request).unwrap();
        assert_eq!(code, "4/abcDEF");
        assert_eq!(state, "xyzzy");
    }

    #[test]
    fn test_parse_callback_reports_denial() {
        let request = "GET /?error=access_denied HTTP/1.1\r\n\r\n";
        let err = parse_callback(request).unwrap_err();
        assert!(matches!(err, Error::Auth(message) if message.contains("access_denied")));
    }

    #[test]
    fn test_parse_callback_rejects_missing_code() {
        let request = "GET /?state=only HTTP/1.1\r\n\r\n";
        assert!(parse_callback(request).is_err());

        assert!(parse_callback("").is_err());
    }

    #[test]
    fn test_secrets_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secrets.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"id","client_secret":"secret","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();

        let config = AuthConfig::from_secrets_file(&path).unwrap();
        assert_eq!(config.client_id, "id");
        assert_eq!(config.client_secret, "secret");
        assert_eq!(config.redirect_uris, vec!["http://localhost"]);
    }

    #[test]
    fn test_missing_secrets_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = AuthConfig::from_secrets_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
