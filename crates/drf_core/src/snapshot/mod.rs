//! The on-disk knowledge base: a vector index and its aligned chunk list.
//!
//! Layout of a snapshot directory:
//! - `chunks.txt`    chunk list, chunks joined by `\n---\n`
//! - `index.bin`     vector index, see [`VectorIndex::to_bytes`]
//! - `manifest.json` counts, dims, embed model and SHA-256 digests of both files

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::formats::{join_chunk_list, split_chunk_list};
use crate::index::{SearchHit, VectorIndex};

pub const CHUNKS_FILE: &str = "chunks.txt";
pub const INDEX_FILE: &str = "index.bin";
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_FORMAT_VERSION: u32 = 1;

/// A vector index paired with the chunk each vector was embedded from.
///
/// Vector `i` belongs to `chunks[i]`; construction refuses unequal counts.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBaseSnapshot {
    chunks: Vec<String>,
    index: VectorIndex,
}

impl KnowledgeBaseSnapshot {
    pub fn new(chunks: Vec<String>, index: VectorIndex) -> Result<Self, AppError> {
        if chunks.len() != index.len() {
            return Err(desync(chunks.len(), index.len()));
        }
        Ok(Self { chunks, index })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.index.dims()
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Chunk text for an index id. A miss means the pair is out of sync.
    pub fn chunk(&self, id: usize) -> Result<&str, AppError> {
        self.chunks.get(id).map(String::as_str).ok_or_else(|| {
            AppError::new("KB_DESYNC", "Index returned an id outside the chunk list")
                .with_details(format!("id={id}; chunks={}", self.chunks.len()))
        })
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AppError> {
        self.index.search(query, k)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub embed_model: String,
    pub dims: u32,
    pub chunk_count: u32,
    pub chunks_sha256: String,
    pub index_sha256: String,
    pub built_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSaveInput {
    pub embed_model: String,
    // RFC3339, supplied by the caller.
    pub built_at: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn chunks_path(&self) -> PathBuf {
        self.root.join(CHUNKS_FILE)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.root.as_path()).map_err(|e| {
            AppError::new(
                "KB_SNAPSHOT_WRITE_FAILED",
                "Failed to create snapshot directory",
            )
            .with_details(format!("path={}; err={}", self.root.display(), e))
        })
    }

    /// Persist a snapshot. The manifest is written last, so a directory with
    /// a manifest always has both data files from the same save.
    pub fn save(
        &self,
        snapshot: &KnowledgeBaseSnapshot,
        input: SnapshotSaveInput,
    ) -> Result<SnapshotManifest, AppError> {
        self.ensure_dirs()?;

        let chunk_list = join_chunk_list(&snapshot.chunks)?;
        let index_bytes = snapshot.index.to_bytes()?;

        write_atomic(&self.chunks_path(), chunk_list.as_bytes(), "chunk list")?;
        write_atomic(&self.index_path(), &index_bytes, "vector index")?;

        let dims = manifest_u32(snapshot.dims(), "dims")?;
        let chunk_count = manifest_u32(snapshot.len(), "chunk_count")?;
        let manifest = SnapshotManifest {
            format_version: MANIFEST_FORMAT_VERSION,
            embed_model: input.embed_model,
            dims,
            chunk_count,
            chunks_sha256: sha256_hex(chunk_list.as_bytes()),
            index_sha256: sha256_hex(&index_bytes),
            built_at: input.built_at,
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| {
            AppError::new("KB_SNAPSHOT_WRITE_FAILED", "Failed to encode snapshot manifest")
                .with_details(e.to_string())
        })?;
        write_atomic(&self.manifest_path(), json.as_bytes(), "snapshot manifest")?;

        tracing::info!(
            path = %self.root.display(),
            chunks = manifest.chunk_count,
            dims = manifest.dims,
            "saved knowledge base snapshot"
        );
        Ok(manifest)
    }

    pub fn load(&self) -> Result<(KnowledgeBaseSnapshot, SnapshotManifest), AppError> {
        let chunks_path = self.chunks_path();
        let index_path = self.index_path();
        let manifest_path = self.manifest_path();
        for path in [&chunks_path, &index_path, &manifest_path] {
            if !path.exists() {
                return Err(AppError::new(
                    "KB_SNAPSHOT_MISSING",
                    "Knowledge base snapshot file not found",
                )
                .with_details(format!("path={}", path.display())));
            }
        }

        let chunk_bytes = read_file(&chunks_path, "chunk list")?;
        let chunk_list = String::from_utf8(chunk_bytes).map_err(|e| {
            AppError::new("KB_SNAPSHOT_CORRUPT", "Chunk list is not valid UTF-8")
                .with_details(format!("path={}; err={}", chunks_path.display(), e))
        })?;
        let chunks = split_chunk_list(&chunk_list);

        let index_bytes = read_file(&index_path, "vector index")?;
        let index = VectorIndex::from_bytes(&index_bytes).map_err(|e| {
            let details = e.details.clone().unwrap_or_default();
            e.with_details(format!("path={}; {details}", index_path.display()))
        })?;

        // Alignment is checked before anything else so a mismatched pair is
        // always reported as such.
        if chunks.len() != index.len() {
            return Err(desync(chunks.len(), index.len()));
        }

        let manifest_bytes = read_file(&manifest_path, "snapshot manifest")?;
        let manifest: SnapshotManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            AppError::new("KB_SNAPSHOT_CORRUPT", "Failed to decode snapshot manifest")
                .with_details(format!("path={}; err={}", manifest_path.display(), e))
        })?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(AppError::new(
                "KB_SNAPSHOT_CORRUPT",
                "Unsupported snapshot manifest version",
            )
            .with_details(format!("format_version={}", manifest.format_version)));
        }
        if manifest.chunk_count as usize != chunks.len() || manifest.dims as usize != index.dims() {
            return Err(AppError::new(
                "KB_DESYNC",
                "Snapshot files do not match their manifest",
            )
            .with_details(format!(
                "manifest_chunks={}; chunks={}; manifest_dims={}; dims={}",
                manifest.chunk_count,
                chunks.len(),
                manifest.dims,
                index.dims()
            )));
        }
        if manifest.chunks_sha256 != sha256_hex(chunk_list.as_bytes())
            || manifest.index_sha256 != sha256_hex(&index_bytes)
        {
            return Err(AppError::new(
                "KB_DESYNC",
                "Snapshot file digests do not match their manifest",
            )
            .with_details(format!("path={}", self.root.display())));
        }

        tracing::info!(
            path = %self.root.display(),
            chunks = chunks.len(),
            dims = index.dims(),
            embed_model = %manifest.embed_model,
            "loaded knowledge base snapshot"
        );
        let snapshot = KnowledgeBaseSnapshot::new(chunks, index)?;
        Ok((snapshot, manifest))
    }
}

fn manifest_u32(value: usize, field: &str) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| {
        AppError::new("KB_SNAPSHOT_WRITE_FAILED", "Snapshot is too large for its manifest")
            .with_details(format!("{field}={value}; max={}", u32::MAX))
    })
}

fn desync(chunks: usize, vectors: usize) -> AppError {
    AppError::new(
        "KB_DESYNC",
        "Chunk list and vector index disagree in count",
    )
    .with_details(format!("chunks={chunks}; vectors={vectors}"))
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|e| {
        AppError::new("KB_SNAPSHOT_CORRUPT", format!("Failed to read {what}"))
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn write_atomic(path: &Path, bytes: &[u8], what: &str) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| {
        AppError::new("KB_SNAPSHOT_WRITE_FAILED", format!("Failed to write {what}"))
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(
            "KB_SNAPSHOT_WRITE_FAILED",
            format!("Failed to finalize {what} write"),
        )
        .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}
