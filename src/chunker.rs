//! Boundary-aware text chunking.
//!
//! Splits loader segments into size-bounded, overlapping chunk candidates.
//! The splitter prefers the largest boundary that fits: paragraph breaks,
//! then line breaks, then sentence bounds, then words, with a hard
//! character cut as the last resort. The trailing `chunk_overlap`
//! characters of each chunk are carried into the next so concepts spanning
//! a boundary stay retrievable from either side.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::loader::{Segment, SegmentKind};

/// A chunk candidate: text plus inherited segment metadata, not yet
/// embedded or assigned an index identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCandidate {
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub kind: SegmentKind,
    pub ocr_confidence: Option<f32>,
    /// Position within the document's chunk sequence.
    pub sequence_index: u32,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_chars: usize,
}

impl Chunker {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_chunk_chars: config.min_chunk_chars,
        }
    }

    /// Split segments into candidates. Fails with `EmptyInput` when nothing
    /// non-trivial survives — ingestion must not silently build an empty index.
    pub fn split(&self, segments: &[Segment]) -> Result<Vec<ChunkCandidate>, RagError> {
        let mut candidates = Vec::new();
        let mut sequence_index = 0u32;

        for segment in segments {
            for piece in self.split_text(&segment.text) {
                let trimmed = piece.trim();
                if trimmed.len() < self.min_chunk_chars {
                    continue;
                }
                candidates.push(ChunkCandidate {
                    text: trimmed.to_string(),
                    source: segment.source.clone(),
                    page: segment.page,
                    kind: segment.kind,
                    ocr_confidence: segment.ocr_confidence,
                    sequence_index,
                });
                sequence_index += 1;
            }
        }

        if candidates.is_empty() {
            return Err(RagError::EmptyInput);
        }
        Ok(candidates)
    }

    /// Split one text body into overlapping, size-bounded chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces = split_recursive(text, 0, self.chunk_size);
        self.merge_with_overlap(pieces)
    }

    /// Greedily pack boundary pieces into chunks up to `chunk_size`,
    /// seeding each new chunk with the tail of the previous one.
    fn merge_with_overlap(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if !current.is_empty() && current.len() + piece.len() > self.chunk_size {
                let overlap = tail(&current, self.chunk_overlap).to_string();
                chunks.push(std::mem::take(&mut current));
                current = overlap;
            }
            // The piece joins unconditionally, in the same iteration that
            // seeded the overlap: an overlap-only chunk is never emitted,
            // and a chunk runs over by at most `chunk_overlap`.
            current.push_str(&piece);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Boundary hierarchy, largest first. Level 4 is a hard character cut.
fn split_at_level(text: &str, level: usize, chunk_size: usize) -> Vec<String> {
    match level {
        0 => split_keeping(text, "\n\n"),
        1 => split_keeping(text, "\n"),
        2 => text.split_sentence_bounds().map(str::to_string).collect(),
        3 => text.split_word_bounds().map(str::to_string).collect(),
        _ => hard_cut(text, chunk_size),
    }
}

fn split_recursive(text: &str, level: usize, chunk_size: usize) -> Vec<String> {
    if text.len() <= chunk_size {
        return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }
    if level > 4 {
        return hard_cut(text, chunk_size);
    }

    let pieces = split_at_level(text, level, chunk_size);
    if pieces.len() <= 1 {
        return split_recursive(text, level + 1, chunk_size);
    }

    let mut out = Vec::new();
    for piece in pieces {
        if piece.len() > chunk_size {
            out.extend(split_recursive(&piece, level + 1, chunk_size));
        } else {
            out.push(piece);
        }
    }
    out
}

/// Split on a separator, keeping the separator attached to the piece
/// before it so no characters are lost.
fn split_keeping(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(separator) {
        let end = pos + separator.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

fn hard_cut(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > chunk_size {
        let mut end = chunk_size;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Last `n` bytes of `s`, snapped forward to a char boundary.
fn tail(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut idx = s.len() - n;
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    &s[idx..]
}
