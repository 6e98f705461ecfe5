use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use podsight::application::services::{
    AdmissionController, AnalysisPipeline, PipelineGate, Segmenter, TranscriptionPool,
};
use podsight::infrastructure::llm::ChatSummarizer;
use podsight::infrastructure::observability::{TracingConfig, init_tracing};
use podsight::infrastructure::source::HttpSourceFetcher;
use podsight::infrastructure::stt::WhisperApiClient;
use podsight::presentation::{AppState, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CONFIG_PATH").ok().map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    init_tracing(
        TracingConfig {
            json_format: settings.logging.json,
            default_directives: settings.logging.level.clone(),
            ..TracingConfig::default()
        },
        settings.server.port,
    );

    let work_dir = settings.pipeline.work_dir.clone();
    std::fs::create_dir_all(&work_dir)?;

    let admission = Arc::new(AdmissionController::new(work_dir.clone()));
    let gate = Arc::new(PipelineGate::new(settings.pipeline.max_concurrent_jobs));
    let fetcher = Arc::new(HttpSourceFetcher::new());

    let stt = Arc::new(WhisperApiClient::new(
        settings.stt.api_key.clone(),
        settings.stt.base_url.clone(),
        settings.stt.model.clone(),
    ));
    let summarizer = Arc::new(ChatSummarizer::new(
        settings.llm.api_key.clone(),
        settings.llm.base_url.clone(),
        settings.llm.model.clone(),
        settings.llm.max_tokens,
        settings.llm.temperature,
        settings.llm.max_transcript_chars,
    ));

    let pool = TranscriptionPool::new(
        stt,
        settings.pipeline.transcription_parallelism,
        settings.pipeline.transcription_attempts,
        Duration::from_secs(settings.pipeline.retry_delay_secs),
    );
    let segmenter = Segmenter::new(
        work_dir.clone(),
        settings.pipeline.segmenter_bin.clone(),
        settings.pipeline.chunk_duration_secs,
        settings.pipeline.segment_progress_ceiling,
        Duration::from_secs(settings.pipeline.kill_grace_secs),
    );

    let pipeline = Arc::new(AnalysisPipeline::new(
        Arc::clone(&admission),
        Arc::clone(&gate),
        fetcher.clone(),
        summarizer,
        pool,
        segmenter,
        work_dir,
    ));

    let state = AppState {
        pipeline,
        admission,
        fetcher,
        settings: settings.clone(),
    };

    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
