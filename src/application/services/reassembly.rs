use std::collections::HashMap;

use crate::domain::{ChunkResult, TranscriptLine};

/// A paragraph is not flushed on sentence punctuation until it holds
/// at least this many characters.
pub const PARAGRAPH_MIN_CHARS: usize = 50;
/// Upper end of the target paragraph band for punctuation flushes.
pub const PARAGRAPH_TARGET_CHARS: usize = 300;
/// Past this the buffer is flushed unconditionally, bounding paragraph
/// size when punctuation is sparse.
pub const PARAGRAPH_HARD_MAX_CHARS: usize = 400;

const SENTENCE_TERMINALS: [char; 6] = ['。', '！', '？', '!', '?', '.'];

/// Restores chunk-index order from out-of-order parallel completions
/// and merges sub-segments into paragraph-level transcript lines.
///
/// Chunks marked unavailable (or absent from the map) contribute no
/// text and no gap marker; the transcript is simply shorter. Pure over
/// its inputs, so re-running on the same map yields identical output.
pub fn reassemble(
    results: &HashMap<usize, ChunkResult>,
    chunk_count: usize,
    chunk_duration: f64,
) -> Vec<TranscriptLine> {
    let mut lines = Vec::new();
    let mut buffer = ParagraphBuffer::new();

    for index in 0..chunk_count {
        let Some(result) = results.get(&index) else {
            continue;
        };
        let offset = index as f64 * chunk_duration;
        for segment in result.segments() {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }
            buffer.push(offset + segment.start, offset + segment.end, text);

            let ends_sentence = text.ends_with(&SENTENCE_TERMINALS[..]);
            let in_band =
                (PARAGRAPH_MIN_CHARS..=PARAGRAPH_TARGET_CHARS).contains(&buffer.char_len);
            if (ends_sentence && in_band) || buffer.char_len > PARAGRAPH_HARD_MAX_CHARS {
                buffer.flush_into(&mut lines);
            }
        }
    }

    buffer.flush_into(&mut lines);
    lines
}

struct ParagraphBuffer {
    text: String,
    char_len: usize,
    start: Option<f64>,
    end: f64,
}

impl ParagraphBuffer {
    fn new() -> Self {
        Self {
            text: String::new(),
            char_len: 0,
            start: None,
            end: 0.0,
        }
    }

    fn push(&mut self, start: f64, end: f64, text: &str) {
        if self.start.is_none() {
            self.start = Some(start);
        }
        self.text.push_str(text);
        self.char_len += text.chars().count();
        self.end = end;
    }

    fn flush_into(&mut self, lines: &mut Vec<TranscriptLine>) {
        if let Some(start) = self.start.take() {
            lines.push(TranscriptLine {
                start,
                end: self.end,
                text: std::mem::take(&mut self.text),
            });
            self.char_len = 0;
        }
    }
}
