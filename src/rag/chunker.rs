//! Overlapping text chunker for document ingestion.
//!
//! Splits document text into chunks of at most `chunk_size` characters
//! with `chunk_overlap` characters shared between neighbors. Every chunk
//! is a contiguous slice of the input, so concatenating chunks in order
//! with the overlaps removed reconstructs the input exactly.

/// A contiguous span of document text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The text content.
    pub text: String,
    /// Character offset of the chunk within the source text.
    pub start_offset: usize,
}

/// Configurable splitter; prefers paragraph, sentence, then word
/// boundaries before falling back to a hard cut.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split text into overlapping chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        let mut chunks = Vec::new();
        if total == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                find_break(&chars, start, hard_end)
            } else {
                hard_end
            };

            chunks.push(Chunk {
                text: chars[start..end].iter().collect(),
                start_offset: start,
            });

            if end >= total {
                break;
            }
            // Step back by the overlap, but always make forward progress.
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

/// Pick a cut point in the last fifth of the window: after a paragraph
/// break, a sentence ending, or a whitespace gap, in that order. Falls
/// back to the hard window end.
fn find_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    let window = hard_end - start;
    let floor = (start + window * 4 / 5).max(start + 1);

    let mut idx = hard_end - 1;
    while idx >= floor {
        if chars[idx] == '\n' && chars[idx - 1] == '\n' {
            return idx + 1;
        }
        idx -= 1;
    }

    let mut idx = hard_end - 1;
    while idx >= floor {
        if matches!(chars[idx - 1], '.' | '!' | '?') && chars[idx].is_whitespace() {
            return idx + 1;
        }
        idx -= 1;
    }

    let mut idx = hard_end - 1;
    while idx >= floor {
        if chars[idx].is_whitespace() {
            return idx + 1;
        }
        idx -= 1;
    }

    hard_end
}
