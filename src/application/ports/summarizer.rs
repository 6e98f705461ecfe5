use async_trait::async_trait;

/// External summarization collaborator. Consumes the full reassembled
/// transcript and returns a structured JSON document the pipeline
/// treats as opaque.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<serde_json::Value, SummarizerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
