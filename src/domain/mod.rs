mod chunk;
mod chunk_result;
mod job;
mod progress;
mod source;
mod stage;
mod transcript;

pub use chunk::{Chunk, ChunkStore};
pub use chunk_result::{ChunkResult, SpeechSegment};
pub use job::{ClientKey, Job, JobId};
pub use progress::ProgressEvent;
pub use source::AudioSource;
pub use stage::Stage;
pub use transcript::{TranscriptLine, format_timestamp, render_transcript};
