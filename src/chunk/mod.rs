//! Token-bounded text chunking
//!
//! This module handles splitting extracted text into chunks while:
//! - Keeping every chunk within the configured token budget
//! - Preferring paragraph, then line, then word boundaries
//! - Carrying a bounded token overlap between neighbouring chunks
//! - Computing content-addressed chunk ids

mod boundaries;
mod tokenizer;

pub use boundaries::*;
pub use tokenizer::*;

#[cfg(test)]
pub(crate) use tokenizer::test_support;

use crate::error::{Error, Result};
use blake3::Hasher;
use std::collections::VecDeque;
use std::sync::Arc;

/// A text chunk with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk text, trimmed of surrounding whitespace
    pub text: String,

    /// Byte start position in the source text
    pub char_start: usize,

    /// Byte end position in the source text
    pub char_end: usize,

    /// Chunk index (0-based)
    pub index: usize,

    /// Tokens in `text` as counted by the splitter's tokenizer
    pub token_count: usize,
}

impl TextChunk {
    /// Content-addressed id: identical text always yields the same id
    pub fn chunk_id(&self) -> String {
        compute_chunk_id(&self.text)
    }
}

/// Hex digest of the chunk text
pub fn compute_chunk_id(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Chars scanned per token of budget when cutting unbroken text
const HARD_SPLIT_CHARS_PER_TOKEN: usize = 8;

/// Recursive splitter measured in tokens
pub struct TokenSplitter {
    counter: Arc<dyn TokenCounter>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TokenSplitter {
    pub fn new(counter: Arc<dyn TokenCounter>, chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            counter,
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn count(&self, text: &str, start: usize, end: usize) -> Result<usize> {
        self.counter.count_tokens(text[start..end].trim())
    }

    /// Split `text` into ordered chunks of at most `chunk_size` tokens
    ///
    /// Empty or whitespace-only input yields no chunks. A single character
    /// that alone exceeds the budget is emitted as its own chunk.
    pub fn split(&self, text: &str) -> Result<Vec<TextChunk>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut pieces = Vec::new();
        self.split_to_fit(text, 0, text.len(), 0, &mut pieces)?;
        self.merge(text, &pieces)
    }

    /// Break a span into pieces that each fit the budget
    fn split_to_fit(
        &self,
        text: &str,
        start: usize,
        end: usize,
        level: usize,
        out: &mut Vec<(usize, usize)>,
    ) -> Result<()> {
        if self.count(text, start, end)? <= self.chunk_size {
            out.push((start, end));
            return Ok(());
        }

        match Separator::ORDER.get(level) {
            Some(separator) => {
                let spans = split_spans(text, start, end, *separator);
                if spans.len() == 1 {
                    return self.split_to_fit(text, start, end, level + 1, out);
                }
                for (s, e) in spans {
                    self.split_to_fit(text, s, e, level + 1, out)?;
                }
                Ok(())
            }
            None => self.hard_split(text, start, end, out),
        }
    }

    /// Cut a span with no usable separator at the longest prefix that fits
    ///
    /// Only a budget-sized window past the cursor is searched, so a long
    /// unbroken run costs time linear in its length.
    fn hard_split(&self, text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) -> Result<()> {
        let window = (self.chunk_size + 1) * HARD_SPLIT_CHARS_PER_TOKEN;
        let mut cursor = start;
        while cursor < end {
            let candidates = char_boundaries(text, cursor, end, window);
            let mut lo = 0;
            let mut hi = candidates.len();
            // invariant: candidates[..lo] fit, candidates[hi..] do not
            while lo < hi {
                let mid = (lo + hi) / 2;
                if self.count(text, cursor, candidates[mid])? <= self.chunk_size {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            let cut = if lo == 0 { candidates[0] } else { candidates[lo - 1] };
            out.push((cursor, cut));
            cursor = cut;
        }
        Ok(())
    }

    /// Greedily merge adjacent pieces into chunks, keeping an overlap tail
    fn merge(&self, text: &str, pieces: &[(usize, usize)]) -> Result<Vec<TextChunk>> {
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut window: VecDeque<(usize, usize)> = VecDeque::new();

        for &(piece_start, piece_end) in pieces {
            if let Some(&(window_start, _)) = window.front() {
                if self.count(text, window_start, piece_end)? > self.chunk_size {
                    self.emit(text, &window, &mut chunks)?;
                    let keep_from = self.overlap_start(text, &window, piece_end)?;
                    window.drain(..keep_from);
                }
            }
            window.push_back((piece_start, piece_end));
        }

        self.emit(text, &window, &mut chunks)?;
        Ok(chunks)
    }

    /// Index of the first window piece kept as overlap for the next chunk
    ///
    /// The kept tail must fit the overlap budget and, joined with the next
    /// piece, the chunk budget. Both counts shrink as pieces are dropped from
    /// the front, so the first qualifying index is found by bisection.
    fn overlap_start(&self, text: &str, window: &VecDeque<(usize, usize)>, next_end: usize) -> Result<usize> {
        let end = window_end(window);
        let mut lo = 0;
        let mut hi = window.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let from = window[mid].0;
            let fits = self.count(text, from, end)? <= self.chunk_overlap
                && self.count(text, from, next_end)? <= self.chunk_size;
            if fits {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    fn emit(&self, text: &str, window: &VecDeque<(usize, usize)>, chunks: &mut Vec<TextChunk>) -> Result<()> {
        let Some(&(start, _)) = window.front() else {
            return Ok(());
        };
        let end = window_end(window);
        let chunk_text = text[start..end].trim();
        if chunk_text.is_empty() {
            return Ok(());
        }

        // Overlap can leave a window that repeats the previous chunk exactly
        if let Some(last) = chunks.last() {
            if last.char_start <= start && end <= last.char_end {
                return Ok(());
            }
        }

        chunks.push(TextChunk {
            text: chunk_text.to_string(),
            char_start: start,
            char_end: end,
            index: chunks.len(),
            token_count: self.counter.count_tokens(chunk_text)?,
        });
        Ok(())
    }
}

fn window_end(window: &VecDeque<(usize, usize)>) -> usize {
    window.back().map(|&(_, end)| end).unwrap_or(0)
}
