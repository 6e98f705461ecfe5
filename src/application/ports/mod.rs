mod source_fetcher;
mod speech_to_text;
mod summarizer;

pub use source_fetcher::{SourceError, SourceFetcher};
pub use speech_to_text::{SpeechToText, SttError};
pub use summarizer::{Summarizer, SummarizerError};
