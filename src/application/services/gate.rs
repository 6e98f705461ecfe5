use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Process-wide counting gate bounding the number of simultaneously
/// running pipelines. Waiters are served in FIFO order.
pub struct PipelineGate {
    semaphore: Arc<Semaphore>,
}

/// Holding a slot keeps the pipeline admitted; dropping it releases
/// the slot, so release happens exactly once on every exit path.
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("cancelled while waiting for a pipeline slot")]
    Cancelled,
}

impl PipelineGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GateSlot, GateError> {
        tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                // The semaphore is never closed.
                match permit {
                    Ok(permit) => Ok(GateSlot { _permit: permit }),
                    Err(_) => Err(GateError::Cancelled),
                }
            }
            _ = cancel.cancelled() => Err(GateError::Cancelled),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
