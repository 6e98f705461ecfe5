use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub pipeline: PipelineSettings,
    pub stt: SttSettings,
    pub llm: LlmSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Loads settings from a TOML file when given, falling back to
    /// defaults otherwise. API keys may always be supplied or
    /// overridden via `STT_API_KEY` / `LLM_API_KEY` so secrets stay
    /// out of the config file.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings: Settings = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Settings::default(),
        };
        if let Ok(key) = std::env::var("STT_API_KEY") {
            settings.stt.api_key = key;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            settings.llm.api_key = key;
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory holding staged sources and chunk files.
    pub work_dir: PathBuf,
    /// Nominal duration of each audio chunk, in seconds.
    pub chunk_duration_secs: u64,
    /// Gate capacity: pipelines running at once, process-wide.
    pub max_concurrent_jobs: usize,
    /// STT calls in flight per job.
    pub transcription_parallelism: usize,
    /// Attempts per chunk before it is marked unavailable.
    pub transcription_attempts: u32,
    pub retry_delay_secs: u64,
    /// Cap for the synthetic segmentation progress.
    pub segment_progress_ceiling: u8,
    pub segmenter_bin: String,
    /// How long a TERMed segmenter gets before the hard kill.
    pub kill_grace_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp_files"),
            chunk_duration_secs: 600,
            max_concurrent_jobs: 4,
            transcription_parallelism: 3,
            transcription_attempts: 3,
            retry_delay_secs: 1,
            segment_progress_ceiling: 45,
            segmenter_bin: "ffmpeg".to_string(),
            kill_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Default language hint; requests may override per job.
    pub language: String,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "whisper-large-v3-turbo".to_string(),
            language: "zh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Transcripts are clipped to this many characters before the
    /// summarization call.
    pub max_transcript_chars: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "openai/gpt-oss-20b".to_string(),
            max_tokens: 8192,
            temperature: 0.2,
            max_transcript_chars: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info,podsight=debug,tower_http=debug".to_string(),
            json: false,
        }
    }
}
