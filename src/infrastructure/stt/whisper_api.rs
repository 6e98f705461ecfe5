use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;

use crate::application::ports::{SpeechToText, SttError};
use crate::domain::SpeechSegment;

/// Whisper-compatible transcription endpoint client. Requests
/// `verbose_json` so the response carries per-segment timestamps
/// relative to the submitted chunk.
pub struct WhisperApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
}

impl WhisperApiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperApiClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
    ) -> Result<Vec<SpeechSegment>, SttError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file_part = multipart::Part::bytes(audio.to_vec())
            .file_name("chunk.mp3")
            .mime_str("audio/mpeg")
            .map_err(|e| SttError::ApiRequestFailed(format!("mime: {}", e)))?;

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "verbose_json")
            .part("file", file_part);

        tracing::debug!(model = %self.model, bytes = audio.len(), "Sending chunk to STT service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SttError::ApiRequestFailed(format!("request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SttError::ApiRequestFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let transcription: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            segments = transcription.segments.len(),
            "Chunk transcription completed"
        );

        Ok(transcription
            .segments
            .into_iter()
            .map(|s| SpeechSegment::new(s.start, s.end, s.text))
            .collect())
    }
}
