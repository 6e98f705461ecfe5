#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use podsight::application::ports::{
    SourceError, SourceFetcher, SpeechToText, SttError, Summarizer, SummarizerError,
};
use podsight::application::services::{
    AdmissionController, AnalysisPipeline, PipelineGate, Segmenter, TranscriptionPool,
};
use podsight::domain::{
    AudioSource, ClientKey, Job, JobId, ProgressEvent, SpeechSegment, Stage,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(20);

struct StubFetcher {
    resolve_calls: AtomicUsize,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            resolve_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn resolve(&self, _url: &str) -> Result<String, SourceError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok("https://cdn.example.com/episode.m4a".to_string())
    }

    async fn download(
        &self,
        _url: &str,
        dest: &Path,
        _cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        tokio::fs::write(dest, b"audio").await?;
        Ok(5)
    }
}

struct StubStt {
    delay: Duration,
}

#[async_trait]
impl SpeechToText for StubStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        _language: &str,
    ) -> Result<Vec<SpeechSegment>, SttError> {
        tokio::time::sleep(self.delay).await;
        let key = String::from_utf8_lossy(audio).into_owned();
        let index: u32 = key.parse().unwrap_or(0);
        let text = format!("part {index} {}.", "a".repeat(60));
        Ok(vec![SpeechSegment::new(0.0, 10.0, text)])
    }
}

struct StubSummarizer {
    ok: bool,
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, _transcript: &str) -> Result<Value, SummarizerError> {
        if self.ok {
            Ok(json!({"title": "Episode notes"}))
        } else {
            Err(SummarizerError::ApiRequestFailed("scripted outage".to_string()))
        }
    }
}

/// Slicing stub: the output pattern is the last argument, as in the
/// real invocation; each chunk file carries its segment number.
fn write_segmenter_stub(dir: &Path) -> String {
    let path = dir.join("segmenter.sh");
    let body = r#"#!/bin/sh
for last in "$@"; do :; done
for n in 000 001 002; do
  printf '%s' "$n" > "$(printf '%s' "$last" | sed "s/%03d/$n/")"
done
exit 0
"#;
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

struct Harness {
    pipeline: Arc<AnalysisPipeline>,
    admission: Arc<AdmissionController>,
    fetcher: Arc<StubFetcher>,
    work: TempDir,
}

fn harness(stt_delay: Duration, summarizer_ok: bool) -> Harness {
    let work = tempdir().unwrap();
    let work_dir = work.path().to_path_buf();
    let bin = write_segmenter_stub(work.path());

    let admission = Arc::new(AdmissionController::new(work_dir.clone()));
    let gate = Arc::new(PipelineGate::new(4));
    let fetcher = Arc::new(StubFetcher::new());
    let pool = TranscriptionPool::new(
        Arc::new(StubStt { delay: stt_delay }),
        3,
        2,
        Duration::from_millis(10),
    );
    let segmenter = Segmenter::new(work_dir.clone(), bin, 600, 45, Duration::from_secs(1));

    let pipeline = Arc::new(AnalysisPipeline::new(
        Arc::clone(&admission),
        Arc::clone(&gate),
        fetcher.clone(),
        Arc::new(StubSummarizer { ok: summarizer_ok }),
        pool,
        segmenter,
        work_dir,
    ));

    Harness {
        pipeline,
        admission,
        fetcher,
        work,
    }
}

fn url_job(client_key: &ClientKey) -> Job {
    Job {
        id: JobId::new(),
        client_key: client_key.clone(),
        source: AudioSource::RemoteUrl("https://podcasts.example.com/ep1".to_string()),
        language: "zh".to_string(),
        created_at: Utc::now(),
    }
}

async fn collect_until_terminal(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("stream closed before terminal event");
        let terminal = event.stage.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn prefix_files(work_dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let marker = format!("{prefix}_");
    std::fs::read_dir(work_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&marker))
        })
        .collect()
}

async fn wait_for_cleanup(work_dir: &Path, prefix: &str) {
    for _ in 0..40 {
        if prefix_files(work_dir, prefix).is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("artifacts with prefix {prefix} were not cleaned up");
}

#[tokio::test(flavor = "multi_thread")]
async fn given_remote_url_job_then_stages_progress_and_payload_are_correct() {
    let h = harness(Duration::from_millis(5), true);
    let key = ClientKey::authenticated("alice");
    let job = url_job(&key);
    let job_id = job.id;
    let cancel = h.admission.admit(&key, job_id);
    let (tx, mut rx) = mpsc::channel(64);

    h.pipeline.run(job, cancel, tx).await;
    let events = collect_until_terminal(&mut rx).await;

    assert_eq!(events[0].stage, Stage::Received);
    assert_eq!(events[0].percent, 0);
    assert!(events.windows(2).all(|p| p[0].percent <= p[1].percent));
    assert_eq!(events.iter().filter(|e| e.stage.is_terminal()).count(), 1);

    // The resolved direct url is surfaced on a downloading event.
    assert!(events.iter().any(|e| {
        e.stage == Stage::Downloading
            && e.url.as_deref() == Some("https://cdn.example.com/episode.m4a")
    }));
    assert_eq!(
        events.iter().filter(|e| e.stage == Stage::Transcribing).count(),
        3
    );
    assert!(events.iter().any(|e| e.stage == Stage::Punctuating));
    assert!(events.iter().any(|e| e.stage == Stage::Analyzing));

    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Completed);
    assert_eq!(last.percent, 100);
    let transcript = last.extra["transcript"].as_str().unwrap();
    assert!(transcript.contains("part 1"));
    // Chunk 1 starts at one chunk duration: ten minutes in.
    assert!(transcript.contains("[10:00 - "));
    assert_eq!(last.extra["summary"], json!({"title": "Episode notes"}));

    wait_for_cleanup(h.work.path(), &job_id.as_prefix()).await;
    assert_eq!(h.admission.active_job(&key), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn given_local_file_job_then_no_resolution_is_attempted() {
    let h = harness(Duration::from_millis(5), true);
    let key = ClientKey::authenticated("alice");
    let job_id = JobId::new();
    let staged = h
        .work
        .path()
        .join(format!("{}_source.mp3", job_id.as_prefix()));
    std::fs::write(&staged, b"audio").unwrap();

    let job = Job {
        id: job_id,
        client_key: key.clone(),
        source: AudioSource::LocalFile(staged),
        language: "zh".to_string(),
        created_at: Utc::now(),
    };
    let cancel = h.admission.admit(&key, job_id);
    let (tx, mut rx) = mpsc::channel(64);

    h.pipeline.run(job, cancel, tx).await;
    let events = collect_until_terminal(&mut rx).await;

    assert_eq!(events.last().unwrap().stage, Stage::Completed);
    assert_eq!(h.fetcher.resolve_calls.load(Ordering::SeqCst), 0);
    assert!(events.iter().all(|e| e.url.is_none()));
}

#[tokio::test(flavor = "multi_thread")]
async fn given_missing_local_file_then_terminal_error() {
    let h = harness(Duration::from_millis(5), true);
    let key = ClientKey::authenticated("alice");
    let job_id = JobId::new();
    let job = Job {
        id: job_id,
        client_key: key.clone(),
        source: AudioSource::LocalFile(h.work.path().join("missing.mp3")),
        language: "zh".to_string(),
        created_at: Utc::now(),
    };
    let cancel = h.admission.admit(&key, job_id);
    let (tx, mut rx) = mpsc::channel(64);

    h.pipeline.run(job, cancel, tx).await;
    let events = collect_until_terminal(&mut rx).await;

    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Error);
    assert!(last.msg.as_deref().unwrap().contains("source acquisition"));
    assert_eq!(h.admission.active_job(&key), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn given_summarizer_outage_then_job_completes_with_placeholder() {
    let h = harness(Duration::from_millis(5), false);
    let key = ClientKey::authenticated("alice");
    let job = url_job(&key);
    let cancel = h.admission.admit(&key, job.id);
    let (tx, mut rx) = mpsc::channel(64);

    h.pipeline.run(job, cancel, tx).await;
    let events = collect_until_terminal(&mut rx).await;

    let last = events.last().unwrap();
    assert_eq!(last.stage, Stage::Completed);
    assert_eq!(last.extra["summary"]["title"], "Summary unavailable");
    assert!(!last.extra["transcript"].as_str().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn given_cancellation_during_transcription_then_terminal_cancelled_and_cleaned_up() {
    let h = harness(Duration::from_secs(10), true);
    let key = ClientKey::authenticated("alice");
    let job = url_job(&key);
    let job_id = job.id;
    let cancel = h.admission.admit(&key, job_id);
    let (tx, mut rx) = mpsc::channel(64);

    let pipeline = Arc::clone(&h.pipeline);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        pipeline.run(job, run_cancel, tx).await;
    });

    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("stream closed before terminal event");
        let stage = event.stage;
        events.push(event);
        if stage == Stage::Segmenting {
            cancel.cancel();
        }
        if stage.is_terminal() {
            break;
        }
    }

    assert_eq!(events.last().unwrap().stage, Stage::Cancelled);
    assert_eq!(events.iter().filter(|e| e.stage.is_terminal()).count(), 1);

    handle.await.unwrap();
    wait_for_cleanup(h.work.path(), &job_id.as_prefix()).await;
    assert_eq!(h.admission.active_job(&key), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn given_second_job_for_same_client_then_first_is_superseded() {
    let h = harness(Duration::from_secs(10), true);
    let key = ClientKey::authenticated("alice");

    let first = url_job(&key);
    let first_id = first.id;
    let first_cancel = h.admission.admit(&key, first_id);
    let (tx1, mut rx1) = mpsc::channel(64);

    let pipeline = Arc::clone(&h.pipeline);
    let run_cancel = first_cancel.clone();
    let first_run = tokio::spawn(async move {
        pipeline.run(first, run_cancel, tx1).await;
    });

    // Wait until the first job is past admission and busy.
    loop {
        let event = tokio::time::timeout(RECV_TIMEOUT, rx1.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("stream closed early");
        if event.stage == Stage::Segmenting {
            break;
        }
    }

    let second = url_job(&key);
    let second_id = second.id;
    h.admission.admit(&key, second_id);

    assert!(first_cancel.is_cancelled());
    assert_eq!(h.admission.active_job(&key), Some(second_id));

    // The superseded run winds down as cancelled and must not evict
    // its successor's slot on release.
    let events = collect_until_terminal(&mut rx1).await;
    assert_eq!(events.last().unwrap().stage, Stage::Cancelled);
    first_run.await.unwrap();
    assert_eq!(h.admission.active_job(&key), Some(second_id));
}
