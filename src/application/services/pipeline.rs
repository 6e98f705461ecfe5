use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SourceError, SourceFetcher, Summarizer, SummarizerError};
use crate::domain::{AudioSource, Job, ProgressEvent, Stage, render_transcript};

use super::admission::{AdmissionController, remove_artifacts};
use super::gate::{GateError, PipelineGate};
use super::progress::{PercentRange, ProgressClosed, ProgressSender};
use super::reassembly::reassemble;
use super::segmenter::{SegmentationError, Segmenter};
use super::transcription_pool::{PoolError, TranscriptionPool};

const PERCENT_DOWNLOADING: u8 = 10;
const PERCENT_SEGMENTING: u8 = 30;
const PERCENT_TRANSCRIBED: u8 = 80;
const PERCENT_PUNCTUATING: u8 = 82;
const PERCENT_ANALYZING: u8 = 90;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("job cancelled")]
    Cancelled,
    #[error("source acquisition failed: {0}")]
    SourceAcquisition(String),
    #[error("segmentation failed: {0}")]
    Segmentation(String),
}

impl From<ProgressClosed> for PipelineError {
    fn from(_: ProgressClosed) -> Self {
        // Nobody listening means nobody waiting: treat as cancelled.
        PipelineError::Cancelled
    }
}

impl From<GateError> for PipelineError {
    fn from(_: GateError) -> Self {
        PipelineError::Cancelled
    }
}

impl From<PoolError> for PipelineError {
    fn from(_: PoolError) -> Self {
        PipelineError::Cancelled
    }
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::SourceAcquisition(other.to_string()),
        }
    }
}

impl From<SegmentationError> for PipelineError {
    fn from(e: SegmentationError) -> Self {
        match e {
            SegmentationError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Segmentation(other.to_string()),
        }
    }
}

struct CompletedAnalysis {
    transcript: String,
    summary: Value,
}

/// Orchestrates one job end to end: gate slot, source acquisition,
/// segmentation, parallel transcription, reassembly, summarization.
/// Guarantees exactly one terminal progress event, artifact cleanup on
/// every exit path, and release of the admission slot.
pub struct AnalysisPipeline {
    admission: Arc<AdmissionController>,
    gate: Arc<PipelineGate>,
    fetcher: Arc<dyn SourceFetcher>,
    summarizer: Arc<dyn Summarizer>,
    pool: TranscriptionPool,
    segmenter: Segmenter,
    work_dir: PathBuf,
    transcribe_window: PercentRange,
}

impl AnalysisPipeline {
    pub fn new(
        admission: Arc<AdmissionController>,
        gate: Arc<PipelineGate>,
        fetcher: Arc<dyn SourceFetcher>,
        summarizer: Arc<dyn Summarizer>,
        pool: TranscriptionPool,
        segmenter: Segmenter,
        work_dir: PathBuf,
    ) -> Self {
        let ceiling = segmenter
            .progress_ceiling()
            .clamp(PERCENT_SEGMENTING, PERCENT_TRANSCRIBED);
        Self {
            admission,
            gate,
            fetcher,
            summarizer,
            pool,
            segmenter,
            work_dir,
            transcribe_window: PercentRange::new(ceiling, PERCENT_TRANSCRIBED - ceiling),
        }
    }

    /// Runs the whole pipeline, emitting progress on `tx`. Never
    /// returns an error to the caller; failures become the terminal
    /// `error` event on the stream.
    pub async fn run(&self, job: Job, cancel: CancellationToken, tx: mpsc::Sender<ProgressEvent>) {
        let job_id = job.id;
        let client_key = job.client_key.clone();
        let mut progress = ProgressSender::new(tx);

        let _ = progress
            .emit(ProgressEvent::new(Stage::Received, 0).with_msg("Job received"))
            .await;

        let outcome = self.run_stages(&job, &cancel, &mut progress).await;

        match outcome {
            Ok(analysis) => {
                tracing::info!(
                    job_id = %job_id.as_uuid(),
                    transcript_chars = analysis.transcript.len(),
                    "Job completed"
                );
                let event = ProgressEvent::new(Stage::Completed, 100)
                    .with_extra("transcript", Value::String(analysis.transcript))
                    .with_extra("summary", analysis.summary);
                let _ = progress.emit(event).await;
            }
            Err(PipelineError::Cancelled) => {
                tracing::info!(job_id = %job_id.as_uuid(), "Job cancelled");
                let event = ProgressEvent::new(Stage::Cancelled, progress.percent())
                    .with_msg("Job cancelled");
                let _ = progress.emit(event).await;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id.as_uuid(), error = %e, "Job failed");
                let event =
                    ProgressEvent::new(Stage::Error, progress.percent()).with_msg(e.to_string());
                let _ = progress.emit(event).await;
            }
        }

        remove_artifacts(&self.work_dir, &job_id.as_prefix()).await;
        self.admission.release(&client_key, job_id);
    }

    async fn run_stages(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        progress: &mut ProgressSender,
    ) -> Result<CompletedAnalysis, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Held until this function returns, on any path.
        let _slot = self.gate.acquire(cancel).await?;

        progress
            .emit(
                ProgressEvent::new(Stage::Downloading, PERCENT_DOWNLOADING)
                    .with_msg("Downloading audio..."),
            )
            .await?;
        let source_path = self.acquire_source(job, cancel, progress).await?;

        progress
            .emit(
                ProgressEvent::new(Stage::Segmenting, PERCENT_SEGMENTING)
                    .with_msg("Slicing audio..."),
            )
            .await?;
        let store = self
            .segmenter
            .segment(job.id, &source_path, progress, cancel)
            .await?;

        let results = self
            .pool
            .transcribe_all(&store, &job.language, self.transcribe_window, progress, cancel)
            .await?;

        progress
            .emit(
                ProgressEvent::new(Stage::Punctuating, PERCENT_PUNCTUATING)
                    .with_msg("Assembling transcript..."),
            )
            .await?;
        let lines = reassemble(&results, store.len(), store.chunk_duration());
        let transcript = render_transcript(&lines);

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        progress
            .emit(
                ProgressEvent::new(Stage::Analyzing, PERCENT_ANALYZING)
                    .with_msg("Generating summary..."),
            )
            .await?;
        let summary = match self.summarizer.summarize(&transcript).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id.as_uuid(),
                    error = %e,
                    "Summarization failed; returning placeholder"
                );
                placeholder_summary(&e)
            }
        };

        Ok(CompletedAnalysis {
            transcript,
            summary,
        })
    }

    async fn acquire_source(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        progress: &mut ProgressSender,
    ) -> Result<PathBuf, PipelineError> {
        match &job.source {
            AudioSource::LocalFile(path) => {
                if !path.exists() {
                    return Err(PipelineError::SourceAcquisition(
                        "uploaded file is missing".to_string(),
                    ));
                }
                Ok(path.clone())
            }
            AudioSource::RemoteUrl(url) => {
                let resolved = self.fetcher.resolve(url).await?;
                progress
                    .emit(
                        ProgressEvent::new(Stage::Downloading, progress.percent())
                            .with_url(&resolved),
                    )
                    .await?;

                let dest = self
                    .work_dir
                    .join(format!("{}_source.m4a", job.id.as_prefix()));
                let bytes = self.fetcher.download(&resolved, &dest, cancel).await?;
                tracing::debug!(job_id = %job.id.as_uuid(), bytes, "Source downloaded");
                Ok(dest)
            }
        }
    }
}

fn placeholder_summary(error: &SummarizerError) -> Value {
    serde_json::json!({
        "title": "Summary unavailable",
        "overview": {
            "type": "Error",
            "summary": format!(
                "The summarization service could not produce a result ({error}). \
                 The full transcript is included above."
            ),
        },
    })
}
