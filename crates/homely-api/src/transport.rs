// Shared transport configuration for building reqwest::Client instances.
//
// The token source and the REST client share timeout and user-agent
// settings through this module, so they always talk to the vendor the
// same way.

use std::time::Duration;

use url::Url;

/// Default public endpoint of the Homely SDK.
pub const DEFAULT_BASE_URL: &str = "https://sdk.iotiliti.cloud";

const USER_AGENT: &str = concat!("homely2mqtt/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Root of the vendor API. REST paths live under `{base}/homely/`,
    /// the event channel under `{base}/socket.io/`.
    pub base_url: Url,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Join a REST path under `{base}/homely/`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, crate::error::Error> {
        let full = format!(
            "{}/homely/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        // The constant is a well-formed absolute URL.
        #[allow(clippy::unwrap_used)]
        Self::new(Url::parse(DEFAULT_BASE_URL).unwrap())
    }
}
