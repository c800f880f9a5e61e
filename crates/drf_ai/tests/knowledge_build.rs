use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use drf_ai::embeddings::Embedder;
use drf_ai::knowledge::{build_snapshot, BuildOptions, KnowledgeBase, Retriever};
use drf_core::error::AppError;
use drf_core::snapshot::{SnapshotSaveInput, SnapshotStore, CHUNKS_FILE};

/// Deterministic embedding: [len, first_byte, last_byte]. Counts batches.
#[derive(Debug)]
struct CountingEmbedder {
    batches: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            batches: AtomicUsize::new(0),
        }
    }

    fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn model(&self) -> &str {
        "mock"
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let bytes = t.as_bytes();
                let first = bytes.first().copied().unwrap_or(0) as f32;
                let last = bytes.last().copied().unwrap_or(0) as f32;
                vec![bytes.len() as f32, first, last]
            })
            .collect())
    }
}

fn chunks(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("chunk {i} {}", "x".repeat(i))).collect()
}

#[test]
fn embeds_in_batches() {
    let embedder = CountingEmbedder::new();
    let snapshot = build_snapshot(&embedder, chunks(10), BuildOptions { batch_size: 4 }).expect("build");

    assert_eq!(embedder.batch_count(), 3);
    assert_eq!(snapshot.len(), 10);
    assert_eq!(snapshot.dims(), 3);
    assert_eq!(snapshot.chunks(), chunks(10).as_slice());
}

#[test]
fn refuses_to_build_without_chunks() {
    let err = build_snapshot(&CountingEmbedder::new(), Vec::new(), BuildOptions::default()).unwrap_err();
    assert_eq!(err.code, "KB_NO_CHUNKS");
}

struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn model(&self) -> &str {
        "short"
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
    }
}

#[test]
fn vector_count_must_match_the_batch() {
    let err = build_snapshot(&ShortEmbedder, chunks(3), BuildOptions::default()).unwrap_err();
    assert_eq!(err.code, "AI_EMBEDDINGS_FAILED");
    assert_eq!(err.details.as_deref(), Some("batch=0; inputs=3; vectors=2"));
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model(&self) -> &str {
        "failing"
    }

    fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        Err(AppError::new("AI_EMBEDDINGS_FAILED", "Embeddings request failed")
            .with_details("status=429; body=quota")
            .with_retryable(true))
    }
}

#[test]
fn embedder_failures_surface_once() {
    let err = build_snapshot(&FailingEmbedder, chunks(2), BuildOptions::default()).unwrap_err();
    assert_eq!(err.code, "AI_EMBEDDINGS_FAILED");
    assert!(err.retryable);
    assert!(err.details.as_deref().unwrap_or_default().contains("status=429; body=quota"));
}

#[test]
fn saved_snapshot_reopens_with_identical_retrieval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SnapshotStore::open(dir.path().join("knowledge_base"));

    let embedder = CountingEmbedder::new();
    let snapshot = build_snapshot(&embedder, chunks(6), BuildOptions::default()).expect("build");
    store
        .save(
            &snapshot,
            SnapshotSaveInput {
                embed_model: embedder.model().to_string(),
                built_at: "2026-10-18T00:00:00Z".to_string(),
            },
        )
        .expect("save");
    let fresh = KnowledgeBase::new(CountingEmbedder::new(), snapshot);

    let (reopened, manifest) = KnowledgeBase::open(CountingEmbedder::new(), &store).expect("open");
    assert_eq!(manifest.embed_model, "mock");
    assert_eq!(manifest.chunk_count, 6);

    for query in ["chunk 3 xxx", "c", "chunk 5 xxxxx"] {
        for k in 1..=6 {
            assert_eq!(
                reopened.retrieve_hits(query, k).expect("reopened"),
                fresh.retrieve_hits(query, k).expect("fresh")
            );
        }
    }
    assert_eq!(
        reopened.retrieve("chunk 2 xx", 1).expect("retrieve"),
        "chunk 2 xx"
    );

    // A chunk list that no longer matches the index refuses to open.
    let mut longer = chunks(6);
    longer.push("extra".to_string());
    fs::write(store.root().join(CHUNKS_FILE), longer.join("\n---\n")).expect("overwrite");
    let err = KnowledgeBase::open(CountingEmbedder::new(), &store).unwrap_err();
    assert_eq!(err.code, "KB_DESYNC");
}
