mod chat_summarizer;

pub use chat_summarizer::ChatSummarizer;
