use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use std::time::Duration;

use super::types::RetrievalFailure;

/// Downloads one referenced binary (photo, video, audio).
///
/// Failures are values: the archive builder falls back to a reference line.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RetrievalFailure>;
}

/// Single-attempt HTTP GET with a bounded timeout. No retries.
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    /// Fails when the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

fn classify(error: reqwest::Error) -> RetrievalFailure {
    if error.is_timeout() {
        RetrievalFailure::Timeout
    } else if error.is_builder() {
        RetrievalFailure::InvalidUrl(error.to_string())
    } else {
        RetrievalFailure::Transport(error.to_string())
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RetrievalFailure> {
        let parsed = Url::parse(url).map_err(|e| RetrievalFailure::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RetrievalFailure::InvalidUrl(format!("unsupported scheme in {}", url)));
        }

        debug!("Fetching asset {}", url);
        let response = self.client.get(parsed).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalFailure::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}
