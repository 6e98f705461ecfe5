use tokio::sync::mpsc;

use crate::domain::{ProgressEvent, Stage};

/// The receiving end of the stream has gone away (the caller
/// disconnected). The pipeline treats this as a cancellation signal.
#[derive(Debug, thiserror::Error)]
#[error("progress stream closed")]
pub struct ProgressClosed;

/// Guards the progress wire protocol for one job: stage transitions
/// must be legal, percent never decreases, and exactly one terminal
/// event is delivered. Events that would violate the protocol are
/// dropped with a warning rather than forwarded.
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
    stage: Stage,
    percent: u8,
    terminal_sent: bool,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            stage: Stage::Received,
            percent: 0,
            terminal_sent: false,
        }
    }

    /// Highest percent emitted so far.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn emit(&mut self, mut event: ProgressEvent) -> Result<(), ProgressClosed> {
        if self.terminal_sent {
            tracing::warn!(stage = %event.stage, "Dropping event after terminal");
            return Ok(());
        }
        if !self.stage.can_transition_to(event.stage) && event.stage != self.stage {
            tracing::warn!(
                from = %self.stage,
                to = %event.stage,
                "Dropping event with illegal stage transition"
            );
            return Ok(());
        }

        event.percent = event.percent.clamp(self.percent, 100);

        self.percent = event.percent;
        self.stage = event.stage;
        if event.stage.is_terminal() {
            self.terminal_sent = true;
        }

        self.tx.send(event).await.map_err(|_| ProgressClosed)
    }

    /// Whether the caller is still connected, without emitting anything.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Maps completion counts onto a sub-range of total progress, used by
/// the transcription pool to scale per-chunk events.
#[derive(Debug, Clone, Copy)]
pub struct PercentRange {
    pub start: u8,
    pub span: u8,
}

impl PercentRange {
    pub fn new(start: u8, span: u8) -> Self {
        Self { start, span }
    }

    pub fn at(&self, completed: usize, total: usize) -> u8 {
        if total == 0 {
            return self.start;
        }
        let scaled = (self.span as usize * completed) / total;
        (self.start as usize + scaled).min(100) as u8
    }
}
