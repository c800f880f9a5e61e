use drf_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::client::ApiClient;

pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

// Chunking keeps inputs far below this; guard anyway.
const MAX_INPUT_CHARS: usize = 24_000;

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: ApiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: ApiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = texts.iter().map(|t| truncate_chars(t, MAX_INPUT_CHARS)).collect();
        let req = EmbeddingsRequest {
            model: &self.model,
            input,
        };

        tracing::debug!(model = %self.model, batch = texts.len(), "requesting embeddings");
        let mut resp: EmbeddingsResponse =
            self.client
                .post_json("embeddings", &req, "AI_EMBEDDINGS_FAILED", "embeddings")?;

        resp.data.sort_by_key(|entry| entry.index);
        if resp.data.len() != texts.len() {
            return Err(AppError::new(
                "AI_EMBEDDINGS_FAILED",
                "Embeddings response count does not match the request",
            )
            .with_details(format!("inputs={}; embeddings={}", texts.len(), resp.data.len())));
        }
        if resp.data.iter().any(|entry| entry.embedding.is_empty()) {
            return Err(AppError::new(
                "AI_EMBEDDINGS_FAILED",
                "Embeddings response was empty",
            ));
        }
        Ok(resp.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
