//! Query-time retrieval: embed, search, select.
//!
//! Two selection strategies: plain top-k, and diversity-aware MMR. Naive
//! top-k over a slide deck tends to return near-duplicate chunks from one
//! slide and starve other relevant topics; MMR trades a little relevance
//! for topical spread, controlled by the blend parameter.

use std::sync::Arc;

use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::embedding::Embedder;
use crate::index::{cosine_similarity, OwnerIndex, ScoredChunk, VectorIndex};
use crate::loader::SegmentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Highest similarity, full stop.
    TopK,
    /// Maximal-marginal-relevance over a larger candidate pool.
    Mmr,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    config: RagConfig,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, config: RagConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Retrieve the top chunks for a query. An owner with no index gets an
    /// empty result, not an error — "no documents uploaded yet" is a
    /// normal state.
    pub async fn retrieve(
        &self,
        query: &str,
        owner_id: &str,
        strategy: SelectionStrategy,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        // Capture the snapshot once; a concurrent re-ingestion swap must
        // not change what this query sees mid-operation.
        let Some(snapshot) = self.index.snapshot(owner_id).await else {
            return Ok(Vec::new());
        };
        if snapshot.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query).await?;

        let hits = match strategy {
            SelectionStrategy::TopK => {
                let mut hits = snapshot.search(&query_vector, self.config.fetch_k);
                hits.retain(|hit| hit.score > 0.0);
                hits
            }
            SelectionStrategy::Mmr => mmr_select(
                &snapshot,
                &query_vector,
                self.config.fetch_k,
                self.config.top_k,
                self.config.mmr_lambda,
            ),
        };

        let selected: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|hit| self.passes_ocr_filter(hit))
            .take(self.config.top_k)
            .collect();

        tracing::debug!(
            "retrieved {} chunk(s) for owner {} (strategy {:?})",
            selected.len(),
            owner_id,
            strategy
        );
        Ok(selected)
    }

    /// Low-confidence OCR text is more likely noise than evidence.
    fn passes_ocr_filter(&self, hit: &ScoredChunk) -> bool {
        if hit.chunk.kind != SegmentKind::Image {
            return true;
        }
        hit.chunk
            .ocr_confidence
            .map(|c| c >= self.config.ocr_confidence_threshold)
            .unwrap_or(true)
    }
}

/// Greedy maximal-marginal-relevance selection.
///
/// From a pool of the `fetch_k` most relevant candidates, repeatedly pick
/// the one maximizing `lambda * relevance - (1 - lambda) * max similarity
/// to anything already selected`. `lambda` = 1.0 degrades to plain top-k.
fn mmr_select(
    index: &OwnerIndex,
    query: &[f32],
    fetch_k: usize,
    k: usize,
    lambda: f32,
) -> Vec<ScoredChunk> {
    // Candidate pool: indices into `index.records`, most relevant first.
    // Chunks with no similarity at all are never candidates, however
    // short the pool runs.
    let mut pool: Vec<(usize, f32)> = index
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| (i, cosine_similarity(query, &record.embedding)))
        .filter(|&(_, relevance)| relevance > 0.0)
        .collect();
    pool.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pool.truncate(fetch_k);

    let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k);
    while selected.len() < k && !pool.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &(candidate, relevance)) in pool.iter().enumerate() {
            let max_redundancy = selected
                .iter()
                .map(|&(chosen, _)| {
                    cosine_similarity(
                        &index.records[candidate].embedding,
                        &index.records[chosen].embedding,
                    )
                })
                .fold(0.0f32, f32::max);

            let score = lambda * relevance - (1.0 - lambda) * max_redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(pool.remove(best_pos));
    }

    selected
        .into_iter()
        .map(|(i, score)| ScoredChunk {
            chunk: index.records[i].chunk.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::index::{Chunk, ChunkRecord};

    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn record(text: &str, embedding: Vec<f32>, kind: SegmentKind, ocr: Option<f32>) -> ChunkRecord {
        ChunkRecord {
            chunk: Chunk {
                id: Uuid::new_v4(),
                text: text.to_string(),
                source_document: "deck.pptx".to_string(),
                page_number: Some(1),
                owner_id: "a".to_string(),
                sequence_index: 0,
                kind,
                ocr_confidence: ocr,
                created_at: Utc::now(),
            },
            embedding,
        }
    }

    fn owner_index(records: Vec<ChunkRecord>) -> OwnerIndex {
        OwnerIndex { records }
    }

    async fn retriever_with(
        records: Vec<ChunkRecord>,
        query_vector: Vec<f32>,
        config: RagConfig,
    ) -> (Retriever, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(VectorIndex::open(dir.path()).unwrap());
        index.replace_document("a", "deck.pptx", records).await.unwrap();
        let embedder = Arc::new(FixedEmbedder { vector: query_vector });
        (Retriever::new(embedder, index, config), dir)
    }

    #[tokio::test]
    async fn missing_owner_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(VectorIndex::open(dir.path()).unwrap());
        let retriever = Retriever::new(
            Arc::new(FixedEmbedder { vector: vec![1.0, 0.0] }),
            index,
            RagConfig::default(),
        );

        let hits = retriever
            .retrieve("anything", "nobody", SelectionStrategy::TopK)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn top_k_returns_most_similar_first() {
        let records = vec![
            record("weak", vec![0.2, 0.8], SegmentKind::Text, None),
            record("strong", vec![1.0, 0.0], SegmentKind::Text, None),
        ];
        let mut config = RagConfig::default();
        config.top_k = 2;
        let (retriever, _dir) = retriever_with(records, vec![1.0, 0.0], config).await;

        let hits = retriever
            .retrieve("query", "a", SelectionStrategy::TopK)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.text, "strong");
    }

    #[tokio::test]
    async fn low_confidence_ocr_chunks_are_dropped() {
        let records = vec![
            record("noisy scan", vec![1.0, 0.0], SegmentKind::Image, Some(0.2)),
            record("clean scan", vec![0.9, 0.1], SegmentKind::Image, Some(0.8)),
            record("native text", vec![0.8, 0.2], SegmentKind::Text, None),
        ];
        let (retriever, _dir) =
            retriever_with(records, vec![1.0, 0.0], RagConfig::default()).await;

        let hits = retriever
            .retrieve("query", "a", SelectionStrategy::TopK)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.text != "noisy scan"));
    }

    #[test]
    fn mmr_with_lambda_one_is_plain_relevance() {
        let index = owner_index(vec![
            record("best", vec![1.0, 0.0], SegmentKind::Text, None),
            record("near duplicate", vec![0.99, 0.05], SegmentKind::Text, None),
            record("different topic", vec![0.3, 0.7], SegmentKind::Text, None),
        ]);

        let hits = mmr_select(&index, &[1.0, 0.0], 3, 2, 1.0);
        assert_eq!(hits[0].chunk.text, "best");
        assert_eq!(hits[1].chunk.text, "near duplicate");
    }

    #[test]
    fn mmr_with_low_lambda_prefers_spread() {
        let index = owner_index(vec![
            record("best", vec![1.0, 0.0], SegmentKind::Text, None),
            record("near duplicate", vec![0.99, 0.05], SegmentKind::Text, None),
            record("different topic", vec![0.5, 0.5], SegmentKind::Text, None),
        ]);

        let hits = mmr_select(&index, &[1.0, 0.0], 3, 2, 0.3);
        assert_eq!(hits[0].chunk.text, "best");
        assert_eq!(hits[1].chunk.text, "different topic");
    }
}
