//! Prompt-context assembly from retrieved chunks.
//!
//! Chunks are concatenated in retrieval order, each under a structural
//! header naming its source and page so the model can attribute claims
//! and span-matching can map back to a document. The character budget is
//! a hard boundary at chunk granularity: a chunk is included whole or not
//! at all.

use serde::{Deserialize, Serialize};

use crate::index::ScoredChunk;

/// A `(source, page)` attribution, surfaced on the final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub page: Option<u32>,
}

/// Format retrieved chunks into a bounded context string. Deterministic
/// for a given input sequence.
pub fn assemble(hits: &[ScoredChunk], max_chars: usize) -> String {
    let mut context = String::new();

    for (i, hit) in hits.iter().enumerate() {
        let header = match hit.chunk.page_number {
            Some(page) => format!("[{}] (Source: {}, page {})", i + 1, hit.chunk.source_document, page),
            None => format!("[{}] (Source: {})", i + 1, hit.chunk.source_document),
        };
        let addition = header.len() + hit.chunk.text.len() + 3; // newline + blank line

        if context.len() + addition > max_chars {
            break;
        }

        context.push_str(&header);
        context.push('\n');
        context.push_str(&hit.chunk.text);
        context.push_str("\n\n");
    }

    context.trim_end().to_string()
}

/// Deduplicated source attributions for the first `limit` hits.
pub fn sources(hits: &[ScoredChunk], limit: usize) -> Vec<SourceRef> {
    let mut refs: Vec<SourceRef> = Vec::new();
    for hit in hits.iter().take(limit) {
        let source_ref = SourceRef {
            source: hit.chunk.source_document.clone(),
            page: hit.chunk.page_number,
        };
        if !refs.contains(&source_ref) {
            refs.push(source_ref);
        }
    }
    refs
}
