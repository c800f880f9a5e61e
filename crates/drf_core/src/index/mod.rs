//! Exact (brute force) nearest-neighbor index under Euclidean distance.
//!
//! Vectors are identified by insertion position. The index is built once and
//! never mutated; persistence is a flat little-endian binary file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

mod distance;

pub use distance::l2;

const MAGIC: &[u8; 4] = b"DRFI";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dims: usize,
    // Row-major, `dims` floats per stored vector.
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self, AppError> {
        let first = vectors.first().ok_or_else(|| {
            AppError::new("INDEX_EMPTY", "Cannot build an index without vectors")
        })?;
        let dims = first.as_ref().len();
        if dims == 0 {
            return Err(AppError::new(
                "INDEX_VECTOR_INVALID",
                "Vectors must have at least one dimension",
            ));
        }

        let mut data = Vec::with_capacity(dims * vectors.len());
        for (id, v) in vectors.iter().enumerate() {
            let v = v.as_ref();
            if v.len() != dims {
                return Err(AppError::new(
                    "INDEX_DIMS_MISMATCH",
                    "Vector dimension mismatch across inputs",
                )
                .with_details(format!("expected={dims}; got={}; id={id}", v.len())));
            }
            check_finite(v).map_err(|e| e.with_details(format!("id={id}")))?;
            data.extend_from_slice(v);
        }

        tracing::debug!(dims, count = vectors.len(), "built vector index");
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let start = id.checked_mul(self.dims)?;
        let end = start.checked_add(self.dims)?;
        self.data.get(start..end)
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dims)
    }

    /// The `k` nearest stored vectors, nearest first; equal distances are
    /// ordered by id. `k` larger than the index is an error rather than a
    /// silently shorter result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AppError> {
        if query.len() != self.dims {
            return Err(AppError::new(
                "INDEX_DIMS_MISMATCH",
                "Query dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.dims, query.len())));
        }
        check_finite(query)?;
        let len = self.len();
        if k > len {
            return Err(AppError::new(
                "INDEX_K_OUT_OF_RANGE",
                "Requested more neighbors than the index holds",
            )
            .with_details(format!("k={k}; len={len}")));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .rows()
            .enumerate()
            .map(|(id, v)| SearchHit {
                id,
                distance: distance::l2(query, v),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Encode the index. Fails when dims or count do not fit the `u32` header fields.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        let dims = header_u32(self.dims, "dims")?;
        let count = header_u32(self.len(), "count")?;
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&dims.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        for x in &self.data {
            buf.extend_from_slice(&x.to_le_bytes());
        }
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AppError> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupt(format!("len={}; header_len={HEADER_LEN}", bytes.len())));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("version={version}")));
        }
        let dims = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let count = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
        if dims == 0 || count == 0 {
            return Err(corrupt(format!("dims={dims}; count={count}")));
        }

        let body = &bytes[HEADER_LEN..];
        let expected = dims
            .checked_mul(count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt(format!("dims={dims}; count={count}")))?;
        if body.len() != expected {
            return Err(corrupt(format!("body_len={}; expected={expected}", body.len())));
        }

        let data: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if data.iter().any(|x| !x.is_finite()) {
            return Err(corrupt("non-finite value".to_string()));
        }
        Ok(Self { dims, data })
    }

    /// Write the index to `path` via a temporary file and rename.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let tmp = path.with_extension("tmp");
        let bytes = self.to_bytes()?;
        fs::write(&tmp, bytes).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to write vector index")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to finalize vector index write")
                .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
        })?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::new("KB_SNAPSHOT_MISSING", "Vector index file not found")
                .with_details(format!("path={}", path.display())));
        }
        let bytes = fs::read(path).map_err(|e| {
            AppError::new("INDEX_CORRUPT", "Failed to read vector index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_bytes(&bytes).map_err(|e| {
            let details = e.details.clone().unwrap_or_default();
            e.with_details(format!("path={}; {details}", path.display()))
        })
    }
}

fn check_finite(v: &[f32]) -> Result<(), AppError> {
    if v.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(AppError::new(
            "INDEX_VECTOR_INVALID",
            "Vectors must contain only finite values",
        ))
    }
}

fn header_u32(value: usize, field: &str) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| {
        AppError::new("INDEX_WRITE_FAILED", "Vector index is too large to encode")
            .with_details(format!("{field}={value}; max={}", u32::MAX))
    })
}

fn corrupt(details: String) -> AppError {
    AppError::new("INDEX_CORRUPT", "Vector index file is malformed").with_details(details)
}
