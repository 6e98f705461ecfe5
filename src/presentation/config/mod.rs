mod settings;

pub use settings::{
    LlmSettings, LoggingSettings, PipelineSettings, ServerSettings, Settings, SettingsError,
    SttSettings,
};
