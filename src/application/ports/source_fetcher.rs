use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Source acquisition collaborator: resolves a page or share URL to a
/// direct audio URL and streams it to local disk.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Returns a direct audio URL for `url`, following whatever
    /// indirection the hosting page uses.
    async fn resolve(&self, url: &str) -> Result<String, SourceError>;

    /// Streams `url` into `dest`, checking `cancel` between byte
    /// ranges. Returns the number of bytes written.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("could not resolve audio url: {0}")]
    Unresolvable(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("download cancelled")]
    Cancelled,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
