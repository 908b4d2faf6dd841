//! The retrieval-augmentation engine: the two entry points the
//! surrounding application layer calls.
//!
//! `ingest` runs load → chunk → embed → index and is all-or-nothing: no
//! partial index is ever persisted. `answer` runs retrieve → assemble →
//! generate → ground, with a designed short-circuit when there is nothing
//! to answer from and a designed refusal in strict mode.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::context::{self, SourceRef};
use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::embedding::Embedder;
use crate::generation::GenerativeModel;
use crate::grounding::{Coverage, GroundingScorer};
use crate::index::{Chunk, ChunkRecord, ScoredChunk, VectorIndex};
use crate::loader;
use crate::prompt::{self, AnswerStyle, Turn};
use crate::retrieval::{Retriever, SelectionStrategy};

/// Fixed response for the "no documents and no history" case; returned
/// without ever calling the model.
pub const NOT_FOUND_TEXT: &str =
    "I couldn't find this in the uploaded documents. Please try rephrasing or upload relevant material.";

/// How many source attributions ride along with an answer.
const MAX_SOURCES: usize = 3;

/// Retrieved-character totals behind the confidence label.
const FULL_COVERAGE_CHARS: usize = 800;
const PARTIAL_COVERAGE_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunks_indexed: usize,
    pub source_document: String,
    /// Content fingerprint of the ingested text.
    pub fingerprint: String,
}

/// Displayed confidence indicator, derived from how much source material
/// backed the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    FullyCovered,
    PartiallyInferred,
    GeneralKnowledge,
    NoDocuments,
}

impl ConfidenceLabel {
    pub fn display_text(&self) -> &'static str {
        match self {
            ConfidenceLabel::FullyCovered => "Confidence: Fully covered by notes",
            ConfidenceLabel::PartiallyInferred => "Confidence: Partially inferred",
            ConfidenceLabel::GeneralKnowledge => "Confidence: General knowledge",
            ConfidenceLabel::NoDocuments => "Confidence: No documents",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub text: String,
    pub confidence_label: ConfidenceLabel,
    pub coverage: Coverage,
    pub sources: Vec<SourceRef>,
    pub grounded_spans: Vec<String>,
}

/// Outcome of a query. `Refused` is strict mode declining to return an
/// answer it could not ground — a designed terminal state, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Answered(AnswerResult),
    Refused {
        coverage: Coverage,
        sources: Vec<SourceRef>,
    },
}

pub struct RagEngine {
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn GenerativeModel>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    chunker: Chunker,
    scorer: GroundingScorer,
}

impl RagEngine {
    /// Service handles are injected so tests (and alternative deployments)
    /// can substitute doubles for the remote models.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn GenerativeModel>,
        index: Arc<VectorIndex>,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), index.clone(), config.clone());
        let chunker = Chunker::new(&config);
        let scorer = GroundingScorer::new(&config);
        Self {
            config,
            embedder,
            generator,
            index,
            retriever,
            chunker,
            scorer,
        }
    }

    /// Ingest one document for an owner: extract, chunk, embed, and swap
    /// into the index. Any failure aborts the whole ingestion; the
    /// owner's previous chunks for this document are replaced only after
    /// everything upstream succeeded.
    pub async fn ingest(&self, file_path: &Path, owner_id: &str) -> Result<IngestReport, RagError> {
        let segments = loader::load(file_path)?;
        let candidates = self.chunker.split(&segments)?;

        let source_document = candidates[0].source.clone();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != candidates.len() {
            return Err(RagError::EmbeddingService(format!(
                "embedded {} of {} chunks",
                embeddings.len(),
                candidates.len()
            )));
        }

        let mut hasher = Sha256::new();
        let created_at = Utc::now();
        let records: Vec<ChunkRecord> = candidates
            .into_iter()
            .zip(embeddings)
            .map(|(candidate, embedding)| {
                hasher.update(candidate.text.as_bytes());
                ChunkRecord {
                    chunk: Chunk {
                        id: Uuid::new_v4(),
                        text: candidate.text,
                        source_document: candidate.source,
                        page_number: candidate.page,
                        owner_id: owner_id.to_string(),
                        sequence_index: candidate.sequence_index,
                        kind: candidate.kind,
                        ocr_confidence: candidate.ocr_confidence,
                        created_at,
                    },
                    embedding,
                }
            })
            .collect();
        let fingerprint = hex::encode(hasher.finalize());

        let chunks_indexed = self
            .index
            .replace_document(owner_id, &source_document, records)
            .await?;

        tracing::info!(
            "indexed {} chunk(s) from {} for owner {} (fingerprint {})",
            chunks_indexed,
            source_document,
            owner_id,
            &fingerprint[..12]
        );

        Ok(IngestReport {
            chunks_indexed,
            source_document,
            fingerprint,
        })
    }

    /// Answer a question against an owner's documents.
    pub async fn answer(
        &self,
        question: &str,
        style: AnswerStyle,
        owner_id: &str,
        history: &[Turn],
        strict: bool,
    ) -> Result<AnswerOutcome, RagError> {
        let hits = self
            .retriever
            .retrieve(question, owner_id, self.selection_strategy())
            .await?;

        // Designed shortcut, not an error: nothing retrieved and nothing
        // in the conversation means there is nothing to answer from.
        if hits.is_empty() && history.is_empty() {
            return Ok(AnswerOutcome::Answered(AnswerResult {
                text: NOT_FOUND_TEXT.to_string(),
                confidence_label: ConfidenceLabel::NoDocuments,
                coverage: Coverage::ungrounded(),
                sources: Vec::new(),
                grounded_spans: Vec::new(),
            }));
        }

        // Diagram mode explains the figure under discussion; feeding it
        // retrieval text invites inferring theory the slide never shows.
        let assembled = if style == AnswerStyle::Diagram {
            String::new()
        } else {
            context::assemble(&hits, self.config.max_context_chars)
        };

        let rendered = prompt::render(history, style, &assembled, question);
        let raw = tokio::time::timeout(
            Duration::from_secs(self.config.generation_timeout_secs),
            self.generator.generate(&rendered),
        )
        .await
        .map_err(|_| RagError::Timeout("generative model call".into()))??;

        let text = raw.trim().to_string();
        if text.is_empty() {
            return Err(RagError::Generation("model returned an empty answer".into()));
        }

        let chunk_texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        let coverage = self.scorer.score(&text, &chunk_texts);
        let grounded_spans = self.scorer.grounded_spans(&text, &chunk_texts);
        let sources = context::sources(&hits, MAX_SOURCES);

        if strict && coverage.grounded_pct == 0 {
            tracing::info!(
                "strict mode refusal for owner {}: nothing grounded",
                owner_id
            );
            return Ok(AnswerOutcome::Refused { coverage, sources });
        }

        Ok(AnswerOutcome::Answered(AnswerResult {
            text,
            confidence_label: confidence_label(&hits),
            coverage,
            sources,
            grounded_spans,
        }))
    }

    fn selection_strategy(&self) -> SelectionStrategy {
        if self.config.mmr_lambda >= 1.0 {
            SelectionStrategy::TopK
        } else {
            SelectionStrategy::Mmr
        }
    }
}

/// Label from the amount of source material retrieved: plenty of backing
/// text reads as covered, a sliver as inferred, nothing as general.
fn confidence_label(hits: &[ScoredChunk]) -> ConfidenceLabel {
    let total_chars: usize = hits.iter().map(|h| h.chunk.text.len()).sum();
    if total_chars >= FULL_COVERAGE_CHARS {
        ConfidenceLabel::FullyCovered
    } else if total_chars >= PARTIAL_COVERAGE_CHARS {
        ConfidenceLabel::PartiallyInferred
    } else {
        ConfidenceLabel::GeneralKnowledge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::loader::SegmentKind;

    fn hit(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: Uuid::new_v4(),
                text: text.to_string(),
                source_document: "doc.pdf".to_string(),
                page_number: Some(1),
                owner_id: "a".to_string(),
                sequence_index: 0,
                kind: SegmentKind::Text,
                ocr_confidence: None,
                created_at: Utc::now(),
            },
            score: 0.9,
        }
    }

    #[test]
    fn confidence_tracks_retrieved_volume() {
        assert_eq!(confidence_label(&[]), ConfidenceLabel::GeneralKnowledge);
        assert_eq!(
            confidence_label(&[hit(&"x".repeat(300))]),
            ConfidenceLabel::PartiallyInferred
        );
        assert_eq!(
            confidence_label(&[hit(&"x".repeat(500)), hit(&"y".repeat(500))]),
            ConfidenceLabel::FullyCovered
        );
    }
}
