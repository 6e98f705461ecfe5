mod admission;
mod gate;
mod pipeline;
mod progress;
mod reassembly;
mod segmenter;
mod transcription_pool;

pub use admission::{AdmissionController, remove_artifacts};
pub use gate::{GateError, GateSlot, PipelineGate};
pub use pipeline::{AnalysisPipeline, PipelineError};
pub use progress::{PercentRange, ProgressClosed, ProgressSender};
pub use reassembly::{
    PARAGRAPH_HARD_MAX_CHARS, PARAGRAPH_MIN_CHARS, PARAGRAPH_TARGET_CHARS, reassemble,
};
pub use segmenter::{SegmentationError, Segmenter};
pub use transcription_pool::{PoolError, TranscriptionPool};
