use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SpeechToText;
use crate::domain::{ChunkResult, ChunkStore, ProgressEvent, Stage};

use super::progress::{PercentRange, ProgressSender};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("transcription cancelled")]
    Cancelled,
}

/// Bounded-parallelism executor submitting chunks to the STT
/// collaborator. Results arrive in completion order and are keyed by
/// chunk index; ordering is restored later by reassembly.
pub struct TranscriptionPool {
    stt: Arc<dyn SpeechToText>,
    parallelism: usize,
    attempts: u32,
    retry_delay: Duration,
}

impl TranscriptionPool {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        parallelism: usize,
        attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            stt,
            parallelism: parallelism.max(1),
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    /// Transcribes every chunk with up to `parallelism` calls in
    /// flight. A chunk whose attempts are all exhausted yields
    /// `ChunkResult::Unavailable` and degrades the transcript instead
    /// of failing the job. Emits one progress event per completed
    /// chunk, scaled across `window`.
    pub async fn transcribe_all(
        &self,
        store: &ChunkStore,
        language: &str,
        window: PercentRange,
        progress: &mut ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<HashMap<usize, ChunkResult>, PoolError> {
        let total = store.len();
        let limiter = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks: JoinSet<(usize, ChunkResult)> = JoinSet::new();

        for chunk in store.chunks() {
            let stt = Arc::clone(&self.stt);
            let limiter = Arc::clone(&limiter);
            let task_cancel = cancel.clone();
            let path = chunk.path.clone();
            let index = chunk.index;
            let language = language.to_string();
            let attempts = self.attempts;
            let retry_delay = self.retry_delay;

            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = limiter.acquire_owned() => permit,
                    _ = task_cancel.cancelled() => return (index, ChunkResult::Unavailable),
                };
                let Ok(_permit) = permit else {
                    return (index, ChunkResult::Unavailable);
                };
                let result =
                    transcribe_with_retry(&*stt, &path, &language, attempts, retry_delay, &task_cancel)
                        .await;
                (index, result)
            });
        }

        let mut results = HashMap::with_capacity(total);
        let mut completed = 0usize;

        loop {
            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(PoolError::Cancelled);
                }
            };
            match joined {
                None => break,
                Some(Ok((index, result))) => {
                    completed += 1;
                    results.insert(index, result);
                    let event =
                        ProgressEvent::new(Stage::Transcribing, window.at(completed, total))
                            .with_msg(format!("Transcribing chunk {completed}/{total}"));
                    if progress.emit(event).await.is_err() {
                        tasks.abort_all();
                        return Err(PoolError::Cancelled);
                    }
                }
                Some(Err(e)) => {
                    // A panicked chunk task leaves its index absent;
                    // reassembly treats that the same as unavailable.
                    tracing::error!(error = %e, "Chunk transcription task aborted");
                    completed += 1;
                }
            }
        }

        Ok(results)
    }
}

async fn transcribe_with_retry(
    stt: &dyn SpeechToText,
    path: &PathBuf,
    language: &str,
    attempts: u32,
    retry_delay: Duration,
    cancel: &CancellationToken,
) -> ChunkResult {
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return ChunkResult::Unavailable;
        }

        // Each attempt opens the chunk bytes fresh.
        let audio = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(attempt, error = %e, path = %path.display(), "Failed to read chunk");
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
                continue;
            }
        };

        match stt.transcribe(&audio, language).await {
            Ok(segments) => return ChunkResult::Transcribed(segments),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    error = %e,
                    path = %path.display(),
                    "Chunk transcription attempt failed"
                );
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    tracing::warn!(
        path = %path.display(),
        attempts,
        "Chunk unavailable after exhausting retries"
    );
    ChunkResult::Unavailable
}
