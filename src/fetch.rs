use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetcherConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::media::{image_mime_or_default, is_image, truncate_for_log};
use crate::utils::http::build_http_client;

const ERROR_BODY_LOG_LIMIT: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl FetchedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime_type = image_mime_or_default(&bytes);
        Self { bytes, mime_type }
    }
}

/// Where pipeline stages get their source photos from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str) -> PipelineResult<FetchedImage>;
}

/// Downloads remote images with one bounded-time attempt and a size ceiling.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
    max_bytes: usize,
}

/// Requires both a scheme and a host, e.g. `https://cdn.example.com/a.jpg`.
pub fn validate_image_url(image_url: &str) -> PipelineResult<Url> {
    let trimmed = image_url.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput(
            "image URL must be a non-empty string".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|_| PipelineError::InvalidInput(format!("invalid URL format: {image_url}")))?;
    if parsed.cannot_be_a_base() || parsed.host_str().map_or(true, str::is_empty) {
        return Err(PipelineError::InvalidInput(format!(
            "invalid URL format: {image_url}"
        )));
    }
    Ok(parsed)
}

fn transfer_error(url: &Url, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout(format!("timed out while downloading image from {url}"))
    } else {
        PipelineError::Transfer(format!("failed to download image from {url}: {err}"))
    }
}

impl ImageFetcher {
    pub fn new(config: &FetcherConfig) -> PipelineResult<Self> {
        let client = build_http_client(config.timeout)
            .map_err(|err| PipelineError::Transfer(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    pub async fn fetch(&self, image_url: &str) -> PipelineResult<Vec<u8>> {
        let url = validate_image_url(image_url)?;

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| transfer_error(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Image download failed for {url} with status {status}: {}",
                truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
            );
            return Err(PipelineError::Transfer(format!(
                "failed to download image from {url}: status {status}"
            )));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| transfer_error(&url, err))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > self.max_bytes {
                return Err(PipelineError::PayloadTooLarge {
                    size: bytes.len(),
                    limit: self.max_bytes,
                });
            }
        }

        debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch_image(&self, url: &str) -> PipelineResult<FetchedImage> {
        let bytes = self.fetch(url).await?;
        if !is_image(&bytes) {
            return Err(PipelineError::InvalidInput(format!(
                "content at {url} is not a recognised image format"
            )));
        }
        Ok(FetchedImage::new(bytes))
    }
}
