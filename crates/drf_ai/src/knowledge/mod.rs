//! Text-in, text-out retrieval over a knowledge base snapshot.

use drf_core::error::AppError;
use drf_core::index::VectorIndex;
use drf_core::snapshot::{KnowledgeBaseSnapshot, SnapshotManifest, SnapshotStore};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;

/// The retrieval capability the coach relies on: the `k` most relevant
/// chunks for `query`, joined by blank lines, nearest first.
pub trait Retriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<String, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub id: usize,
    pub distance: f32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase<E> {
    embedder: E,
    snapshot: KnowledgeBaseSnapshot,
}

impl<E: Embedder> KnowledgeBase<E> {
    pub fn new(embedder: E, snapshot: KnowledgeBaseSnapshot) -> Self {
        Self { embedder, snapshot }
    }

    /// Load the snapshot under `store` and pair it with `embedder`.
    pub fn open(embedder: E, store: &SnapshotStore) -> Result<(Self, SnapshotManifest), AppError> {
        let (snapshot, manifest) = store.load()?;
        if manifest.embed_model != embedder.model() {
            tracing::warn!(
                snapshot_model = %manifest.embed_model,
                embedder_model = %embedder.model(),
                "snapshot was built with a different embedding model"
            );
        }
        Ok((Self::new(embedder, snapshot), manifest))
    }

    pub fn snapshot(&self) -> &KnowledgeBaseSnapshot {
        &self.snapshot
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn retrieve_hits(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, AppError> {
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new("INPUT_EMPTY", "Query must not be empty"));
        }

        let qv = self.embedder.embed_one(q)?;
        let hits = self.snapshot.search(&qv, k)?;
        tracing::debug!(
            k,
            ids = ?hits.iter().map(|h| h.id).collect::<Vec<_>>(),
            "retrieved chunks"
        );

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            out.push(RetrievedChunk {
                id: hit.id,
                distance: hit.distance,
                text: self.snapshot.chunk(hit.id)?.to_string(),
            });
        }
        Ok(out)
    }
}

impl<E: Embedder> Retriever for KnowledgeBase<E> {
    fn retrieve(&self, query: &str, k: usize) -> Result<String, AppError> {
        let hits = self.retrieve_hits(query, k)?;
        Ok(hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { batch_size: 64 }
    }
}

/// Embed every chunk and pair the resulting index with the chunk list.
pub fn build_snapshot(
    embedder: &dyn Embedder,
    chunks: Vec<String>,
    opts: BuildOptions,
) -> Result<KnowledgeBaseSnapshot, AppError> {
    if chunks.is_empty() {
        return Err(AppError::new(
            "KB_NO_CHUNKS",
            "No chunks available; chunk the manuscript before building the index",
        ));
    }
    let batch_size = opts.batch_size.max(1);

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let inputs: Vec<&str> = batch.iter().map(String::as_str).collect();
        let out = embedder.embed(&inputs).map_err(|e| {
            let cause = e.details.clone().unwrap_or_default();
            AppError::new("AI_EMBEDDINGS_FAILED", "Failed to compute embeddings")
                .with_details(format!("batch={batch_no}; err={e}; {cause}"))
                .with_retryable(e.retryable)
        })?;
        if out.len() != inputs.len() {
            return Err(AppError::new(
                "AI_EMBEDDINGS_FAILED",
                "Embedder returned the wrong number of vectors",
            )
            .with_details(format!("batch={batch_no}; inputs={}; vectors={}", inputs.len(), out.len())));
        }
        vectors.extend(out);
    }

    let index = VectorIndex::build(&vectors)?;
    tracing::info!(
        chunks = chunks.len(),
        dims = index.dims(),
        model = %embedder.model(),
        "built knowledge base index"
    );
    KnowledgeBaseSnapshot::new(chunks, index)
}
