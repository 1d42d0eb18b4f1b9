use std::future::Future;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Refresh this long before the vendor-declared expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Source of bearer tokens for the REST API and the event channel.
///
/// Implemented by [`PasswordCredentials`]; tests substitute a fixed token.
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token.
    fn access_token(&self) -> impl Future<Output = Result<SecretString, Error>> + Send;

    /// Forget any cached token. Called after the server rejected one, so
    /// the next [`access_token`](Self::access_token) fetches a fresh token.
    fn invalidate(&self) -> impl Future<Output = ()> + Send {
        std::future::ready(())
    }
}

/// A fixed token. Useful when the token is obtained out of band.
#[derive(Debug, Clone)]
pub struct StaticToken(pub SecretString);

impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, Error> {
        Ok(self.0.clone())
    }
}

/// Response body of `POST /homely/oauth/token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds. Absent means "assume the conservative default".
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Username/password credentials exchanged for a bearer token.
///
/// The token is cached and reused until shortly before it expires, so the
/// REST calls and every reconnect of the event channel share one token.
pub struct PasswordCredentials {
    http: reqwest::Client,
    transport: TransportConfig,
    username: String,
    password: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl PasswordCredentials {
    pub fn new(
        username: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            transport: transport.clone(),
            username: username.into(),
            password,
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<CachedToken, Error> {
        let url = self.transport.api_url("oauth/token")?;
        debug!(%url, username = %self.username, "requesting access token");

        let resp = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("username", self.username.as_str()),
                ("password", self.password.expose_secret()),
            ])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: format!("token endpoint returned HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: String::from("<redacted token response>"),
            })?;

        if parsed.access_token.is_empty() {
            return Err(Error::Authentication {
                message: "token endpoint returned an empty access token".into(),
            });
        }

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(1800));
        debug!(expires_in_secs = lifetime.as_secs(), "access token acquired");

        Ok(CachedToken {
            token: SecretString::from(parsed.access_token),
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

impl TokenSource for PasswordCredentials {
    async fn access_token(&self) -> Result<SecretString, Error> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
            debug!("cached access token expired");
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            debug!("cached access token dropped");
        }
    }
}

impl std::fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("username", &self.username)
            .field("base_url", &self.transport.base_url.as_str())
            .finish_non_exhaustive()
    }
}
