use async_trait::async_trait;

use crate::domain::SpeechSegment;

/// External speech-to-text collaborator. Takes the raw bytes of one
/// audio chunk plus a language hint and returns the recognized
/// segments, time-stamped relative to the chunk start.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
    ) -> Result<Vec<SpeechSegment>, SttError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
