pub mod llm;
pub mod observability;
pub mod source;
pub mod stt;
