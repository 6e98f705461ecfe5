/// One recognized utterance, time-stamped relative to its chunk start.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl SpeechSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Outcome of transcribing one chunk. Produced exactly once per chunk
/// index, regardless of completion order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResult {
    /// Sub-segments in temporal order within the chunk.
    Transcribed(Vec<SpeechSegment>),
    /// All retry attempts failed; the chunk contributes no text.
    Unavailable,
}

impl ChunkResult {
    pub fn segments(&self) -> &[SpeechSegment] {
        match self {
            ChunkResult::Transcribed(segments) => segments,
            ChunkResult::Unavailable => &[],
        }
    }
}
