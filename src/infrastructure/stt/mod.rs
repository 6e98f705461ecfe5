mod whisper_api;

pub use whisper_api::WhisperApiClient;
