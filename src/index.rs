//! Per-owner vector index with atomic snapshot semantics.
//!
//! Each owner gets an immutable [`OwnerIndex`] behind an `Arc`. Ingestion
//! builds a fresh index and swaps the `Arc` in under the write lock, so
//! concurrent ingestions serialize against each other while a query
//! holding the previous snapshot stays consistent. Snapshots persist as
//! one JSON file per owner, written to a temporary file and renamed into
//! place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::errors::RagError;
use crate::loader::SegmentKind;

/// The atomic unit of indexing and retrieval. Immutable once created;
/// re-ingestion supersedes a document's chunks wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub text: String,
    pub source_document: String,
    pub page_number: Option<u32>,
    pub owner_id: String,
    pub sequence_index: u32,
    pub kind: SegmentKind,
    pub ocr_confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Immutable per-owner chunk collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerIndex {
    pub records: Vec<ChunkRecord>,
}

impl OwnerIndex {
    /// Brute-force cosine search: descending score, ties broken by
    /// original chunk order (stable sort).
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .records
            .iter()
            .map(|record| ScoredChunk {
                chunk: record.chunk.clone(),
                score: cosine_similarity(query, &record.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

/// On-disk snapshot payload; carries the owner id so a directory of
/// snapshots can be reloaded without decoding file names.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    owner_id: String,
    records: Vec<ChunkRecord>,
}

pub struct VectorIndex {
    dir: PathBuf,
    owners: RwLock<HashMap<String, Arc<OwnerIndex>>>,
}

impl VectorIndex {
    /// Open an index rooted at `dir`, loading any persisted snapshots.
    /// A missing or empty directory is a normal, empty index.
    pub fn open(dir: &Path) -> Result<Self, RagError> {
        std::fs::create_dir_all(dir).map_err(RagError::internal)?;

        let mut owners = HashMap::new();
        for entry in std::fs::read_dir(dir).map_err(RagError::internal)? {
            let entry = entry.map_err(RagError::internal)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(RagError::internal)?;
            let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
                RagError::Index(format!("corrupt snapshot {}: {}", path.display(), e))
            })?;
            owners.insert(
                snapshot.owner_id,
                Arc::new(OwnerIndex {
                    records: snapshot.records,
                }),
            );
        }

        if !owners.is_empty() {
            tracing::info!("loaded {} owner snapshot(s) from {}", owners.len(), dir.display());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            owners: RwLock::new(owners),
        })
    }

    /// Capture the current snapshot for an owner. Queries call this once
    /// and keep the `Arc` for the whole operation.
    pub async fn snapshot(&self, owner_id: &str) -> Option<Arc<OwnerIndex>> {
        self.owners.read().await.get(owner_id).cloned()
    }

    /// Replace an owner's chunks for one source document, then persist.
    ///
    /// The owner's chunks from other documents are kept; previous chunks
    /// of this document are dropped first, so re-ingestion never
    /// accumulates stale duplicates. Returns the number of records added.
    ///
    /// The whole read-modify-write runs under the write lock: concurrent
    /// ingestions for the same owner must each see the other's result,
    /// and persistence must match what gets installed. Queries holding a
    /// previously captured `Arc` are unaffected.
    pub async fn replace_document(
        &self,
        owner_id: &str,
        source_document: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<usize, RagError> {
        let added = records.len();

        let mut owners = self.owners.write().await;
        let mut kept: Vec<ChunkRecord> = owners
            .get(owner_id)
            .map(|index| {
                index
                    .records
                    .iter()
                    .filter(|r| r.chunk.source_document != source_document)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        kept.extend(records);
        let next = Arc::new(OwnerIndex { records: kept });

        // Persist before the in-memory swap so a failed write never
        // leaves memory ahead of disk.
        self.persist(owner_id, &next)?;
        owners.insert(owner_id.to_string(), next);
        Ok(added)
    }

    /// Drop an owner's chunks entirely, including the on-disk snapshot.
    pub async fn purge_owner(&self, owner_id: &str) -> Result<(), RagError> {
        let mut owners = self.owners.write().await;
        owners.remove(owner_id);
        drop(owners);

        let path = self.snapshot_path(owner_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(RagError::internal)?;
        }
        Ok(())
    }

    fn persist(&self, owner_id: &str, index: &OwnerIndex) -> Result<(), RagError> {
        let snapshot = Snapshot {
            owner_id: owner_id.to_string(),
            records: index.records.clone(),
        };
        let payload = serde_json::to_vec(&snapshot).map_err(RagError::internal)?;

        // Write-then-rename keeps readers from ever seeing a torn snapshot.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(RagError::internal)?;
        std::io::Write::write_all(&mut tmp, &payload).map_err(RagError::internal)?;
        tmp.persist(self.snapshot_path(owner_id))
            .map_err(|e| RagError::Index(format!("failed to persist snapshot: {}", e)))?;
        Ok(())
    }

    fn snapshot_path(&self, owner_id: &str) -> PathBuf {
        // Owner ids are arbitrary strings; hash them into a safe file name.
        let digest = Sha256::digest(owner_id.as_bytes());
        self.dir.join(format!("{}.json", &hex::encode(digest)[..16]))
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}
