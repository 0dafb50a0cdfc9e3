use std::time::Duration;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::error::Result;
use crate::fetch::fetch;
use crate::fetch::redirect_policy;
use crate::url_guard::check_outbound;

const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = concat!("typst-mcp/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How the registry client reaches the network. Tests substitute stubs.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn get(&self, url: &str, max_bytes: u64) -> Result<TransportResponse>;
}

/// reqwest-backed transport. Rejects unsafe URLs before any socket is opened
/// and only follows redirects to trusted hosts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|err| RegistryError::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn get(&self, url: &str, max_bytes: u64) -> Result<TransportResponse> {
        if let Err(rule) = check_outbound(url) {
            tracing::warn!("blocked outbound request to {url}: {rule}");
            return Err(RegistryError::SecurityRejected {
                url: url.to_string(),
                rule,
            });
        }

        let response = fetch(&self.client, url, max_bytes).await?;
        Ok(TransportResponse {
            status: response.status.as_u16(),
            body: response.body,
        })
    }
}
