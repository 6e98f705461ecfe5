use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SourceError, SourceFetcher};

const USER_AGENT: &str = "Mozilla/5.0";
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves share-page URLs to direct audio URLs and streams downloads
/// to disk. Resolution first trusts the response content type, then
/// falls back to scanning the page body for a direct `.m4a`/`.mp3`
/// link.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
    audio_url_pattern: Regex,
}

impl HttpSourceFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            // First direct audio link anywhere in the page body.
            audio_url_pattern: Regex::new(r#"https?://[^\s"'<>]+\.(?:m4a|mp3)"#)
                .expect("static regex"),
        }
    }
}

impl Default for HttpSourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn resolve(&self, url: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .timeout(RESOLVE_TIMEOUT)
            .send()
            .await
            .map_err(|e| SourceError::Unresolvable(e.to_string()))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let path_only = url.split('?').next().unwrap_or(url);
        if content_type.contains("audio") || path_only.ends_with(".m4a") || path_only.ends_with(".mp3")
        {
            return Ok(url.to_string());
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Unresolvable(e.to_string()))?;

        match self.audio_url_pattern.find(&body) {
            Some(found) => {
                let resolved = found.as_str().to_string();
                tracing::debug!(url, resolved = %resolved, "Resolved audio url from page body");
                Ok(resolved)
            }
            None => Err(SourceError::Unresolvable(format!(
                "no direct audio url found at {url}"
            ))),
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::DownloadFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| SourceError::DownloadFailed(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(SourceError::Cancelled);
            }
            let bytes = chunk.map_err(|e| SourceError::DownloadFailed(e.to_string()))?;
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }

        file.flush().await?;
        tracing::debug!(url, bytes = written, dest = %dest.display(), "Download complete");
        Ok(written)
    }
}
