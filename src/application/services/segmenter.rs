use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::{ChunkStore, JobId, ProgressEvent, Stage};

use super::progress::ProgressSender;

#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    #[error("failed to spawn segmenter `{bin}`: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("segmenter exited with {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error("segmenter produced no chunks")]
    NoChunks,
    #[error("segmentation cancelled")]
    Cancelled,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives the external audio-slicing tool as a supervised subprocess.
///
/// The tool reports no progress of its own, so the driver emits a
/// synthetic one-percent increment per second, capped at a configured
/// ceiling. This is a documented approximation of slicing progress,
/// not a measurement.
pub struct Segmenter {
    work_dir: PathBuf,
    bin: String,
    chunk_duration_secs: u64,
    progress_ceiling: u8,
    kill_grace: Duration,
}

impl Segmenter {
    pub fn new(
        work_dir: PathBuf,
        bin: String,
        chunk_duration_secs: u64,
        progress_ceiling: u8,
        kill_grace: Duration,
    ) -> Self {
        Self {
            work_dir,
            bin,
            chunk_duration_secs,
            progress_ceiling,
            kill_grace,
        }
    }

    pub fn chunk_duration(&self) -> f64 {
        self.chunk_duration_secs as f64
    }

    /// Where the synthetic segmentation progress tops out.
    pub fn progress_ceiling(&self) -> u8 {
        self.progress_ceiling
    }

    /// Slices `source` into `{job_prefix}_NNN.mp3` files in the work
    /// directory and returns them as an ordered chunk store. Each poll
    /// tick checks both the cancellation token and the progress stream;
    /// on either firing, the subprocess is stopped gracefully (TERM,
    /// bounded wait, then kill) before the call returns.
    pub async fn segment(
        &self,
        job_id: JobId,
        source: &Path,
        progress: &mut ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ChunkStore, SegmentationError> {
        let prefix = job_id.as_prefix();
        let pattern = self.work_dir.join(format!("{prefix}_%03d.mp3"));

        let mut child = Command::new(&self.bin)
            .arg("-i")
            .arg(source)
            .arg("-y")
            .args(["-f", "segment", "-segment_time"])
            .arg(self.chunk_duration_secs.to_string())
            .args(["-c:a", "libmp3lame", "-ab", "64k", "-ar", "16000", "-ac", "1"])
            .args(["-threads", "0"])
            .arg(&pattern)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SegmentationError::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        tracing::debug!(
            job_id = %job_id.as_uuid(),
            bin = %self.bin,
            chunk_secs = self.chunk_duration_secs,
            "Segmenter subprocess started"
        );

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        self.shutdown(&mut child).await;
                        return Err(SegmentationError::Cancelled);
                    }
                    let percent = (progress.percent() + 1).min(self.progress_ceiling);
                    let event = ProgressEvent::new(Stage::Segmenting, percent)
                        .with_msg("Slicing audio...");
                    if progress.emit(event).await.is_err() {
                        // Caller disconnected; no one is listening.
                        self.shutdown(&mut child).await;
                        return Err(SegmentationError::Cancelled);
                    }
                }
            }
        };

        if !status.success() {
            return Err(SegmentationError::NonZeroExit(status));
        }

        let paths = self.collect_chunks(&prefix)?;
        if paths.is_empty() {
            return Err(SegmentationError::NoChunks);
        }

        tracing::info!(
            job_id = %job_id.as_uuid(),
            chunks = paths.len(),
            "Segmentation completed"
        );

        Ok(ChunkStore::from_sorted_paths(paths, self.chunk_duration()))
    }

    /// Lists `{prefix}_NNN.mp3` outputs sorted by segment number. The
    /// numeric filter keeps the staged `{prefix}_source.*` file out of
    /// the store.
    fn collect_chunks(&self, prefix: &str) -> Result<Vec<PathBuf>, SegmentationError> {
        let marker = format!("{prefix}_");
        let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.work_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name
                .strip_prefix(&marker)
                .and_then(|rest| rest.strip_suffix(".mp3"))
            else {
                continue;
            };
            if let Ok(number) = stem.parse::<u32>() {
                numbered.push((number, entry.path()));
            }
        }
        numbered.sort_by_key(|(number, _)| *number);
        Ok(numbered.into_iter().map(|(_, path)| path).collect())
    }

    /// Graceful stop: TERM first, bounded wait, then a hard kill.
    async fn shutdown(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            let _ = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await;
            if tokio::time::timeout(self.kill_grace, child.wait())
                .await
                .is_ok()
            {
                return;
            }
            tracing::warn!(pid, "Segmenter ignored TERM; killing");
        }
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "Failed to kill segmenter subprocess");
        }
    }
}
