// Homely REST client
//
// Wraps `reqwest::Client` with bearer-token injection and response
// decoding for the two one-shot calls the bridge needs: the location list
// and the full home snapshot.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::TokenSource;
use crate::error::Error;
use crate::models::{Home, Location};
use crate::transport::TransportConfig;

/// HTTP client for the Homely REST API.
///
/// Generic over the [`TokenSource`] so tests can inject a fixed token.
pub struct HomelyClient<T> {
    http: reqwest::Client,
    transport: TransportConfig,
    tokens: Arc<T>,
}

impl<T: TokenSource> HomelyClient<T> {
    pub fn new(transport: TransportConfig, tokens: Arc<T>) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            transport,
            tokens,
        })
    }

    /// List the locations visible to the account.
    ///
    /// `GET /homely/locations`
    pub async fn locations(&self) -> Result<Vec<Location>, Error> {
        let url = self.transport.api_url("locations")?;
        debug!("listing locations");
        self.get(url).await
    }

    /// Fetch the full snapshot of one location.
    ///
    /// `GET /homely/home/{locationId}`
    pub async fn home(&self, location_id: &str) -> Result<Home, Error> {
        let url = self.transport.api_url(&format!("home/{location_id}"))?;
        debug!(location_id, "fetching home snapshot");
        self.get(url).await
    }

    /// Send an authenticated GET and decode the JSON body.
    ///
    /// A 401 drops the cached token and retries once with a fresh one.
    async fn get<R: DeserializeOwned>(&self, url: Url) -> Result<R, Error> {
        debug!("GET {}", url);

        let mut resp = self.send_get(&url).await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("access token rejected, fetching a new one");
            self.tokens.invalidate().await;
            resp = self.send_get(&url).await?;
        }

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(Error::Authentication {
                message: "access token rejected".into(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn send_get(&self, url: &Url) -> Result<reqwest::Response, Error> {
        let token = self.tokens.access_token().await?;
        self.http
            .get(url.clone())
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)
    }
}
