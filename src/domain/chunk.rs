use std::path::PathBuf;

/// One fixed-duration slice of the source audio. The index defines
/// temporal order; the time offset of a chunk is `index * chunk_duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub path: PathBuf,
}

/// Ordered set of chunk handles produced by segmentation.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    chunk_duration: f64,
}

impl ChunkStore {
    /// Builds a store from paths already sorted by segment number.
    pub fn from_sorted_paths(paths: Vec<PathBuf>, chunk_duration: f64) -> Self {
        let chunks = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| Chunk { index, path })
            .collect();
        Self {
            chunks,
            chunk_duration,
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_duration(&self) -> f64 {
        self.chunk_duration
    }
}
