use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::application::ports::{Summarizer, SummarizerError};

const SYSTEM_PROMPT: &str = "You are an API that outputs only JSON. Produce a thorough, \
well-grounded study document for the given podcast transcript. Every conclusion must cite \
a [mm:ss] position from the transcript; mark anything the transcript does not support as \
uncertain rather than inventing it.";

const USER_PROMPT_HEADER: &str = "Turn the following timestamped podcast transcript into a \
structured JSON study note with fields: title, overview {type, participants, coreIssue, \
summary}, coreConclusions, topicBlocks, concepts, cases, actionableAdvice, criticalReview.\n\n\
Transcript:\n";

/// Summarization adapter speaking the chat-completions protocol with
/// JSON-object response format. The returned document is opaque to the
/// pipeline.
pub struct ChatSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    max_transcript_chars: usize,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatSummarizer {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: usize,
        temperature: f32,
        max_transcript_chars: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            temperature,
            max_transcript_chars,
        }
    }

    fn build_messages(&self, transcript: &str) -> Vec<ChatMessage> {
        let clipped: String = transcript
            .chars()
            .take(self.max_transcript_chars)
            .collect();
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: format!("{USER_PROMPT_HEADER}{clipped}"),
            },
        ]
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<serde_json::Value, SummarizerError> {
        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.build_messages(transcript),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        tracing::debug!(
            model = %self.model,
            transcript_chars = transcript.len(),
            "Requesting transcript summary"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SummarizerError::ApiRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::ApiRequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::InvalidResponse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SummarizerError::InvalidResponse("empty choices".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| SummarizerError::InvalidResponse(format!("not a JSON document: {}", e)))
    }
}
