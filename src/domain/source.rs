use std::path::PathBuf;

/// Where the job's audio comes from: a remote episode URL to resolve
/// and download, or a file the caller already uploaded into the work
/// directory.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    RemoteUrl(String),
    LocalFile(PathBuf),
}
