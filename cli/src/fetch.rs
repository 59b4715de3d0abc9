use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::header;
use tracing::debug;

use chow_core::sync::{CatalogSource, FetchError, RemoteResponse};

const CONNECT_TIMEOUT_SECS: u64 = 15;
const READ_TIMEOUT_SECS: u64 = 30;

/// Fetches the catalog over HTTP with conditional-request support.
///
/// Carries `If-None-Match` when a validation token is known and maps 304
/// to [`RemoteResponse::NotModified`], so an unchanged catalog is never
/// re-downloaded. Owns a small runtime so the blocking
/// [`CatalogSource`] contract can be served from synchronous callers.
pub struct HttpCatalogClient {
    client: reqwest::Client,
    url: String,
    rt: tokio::runtime::Runtime,
}

impl HttpCatalogClient {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "chow-cli/{} (nutrition comparison)",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(READ_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build fetch runtime")?;
        Ok(Self { client, url, rt })
    }

    pub async fn fetch_catalog_async(
        &self,
        etag: Option<&str>,
    ) -> Result<RemoteResponse, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!(status = %resp.status(), url = %self.url, "Catalog fetch response");

        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(RemoteResponse::NotModified);
        }
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(RemoteResponse::Payload { text, etag })
    }
}

impl CatalogSource for HttpCatalogClient {
    fn fetch_catalog(&self, etag: Option<&str>) -> Result<RemoteResponse, FetchError> {
        self.rt.block_on(self.fetch_catalog_async(etag))
    }
}
