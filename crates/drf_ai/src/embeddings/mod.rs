use drf_core::error::AppError;

/// Maps text to fixed-length vectors. One model, one dimensionality.
pub trait Embedder {
    fn model(&self) -> &str;

    /// One vector per input, in input order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AppError>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut out = self.embed(&[text])?;
        match (out.pop(), out.is_empty()) {
            (Some(v), true) => Ok(v),
            _ => Err(AppError::new(
                "AI_EMBEDDINGS_FAILED",
                "Embedder did not return exactly one vector",
            )),
        }
    }
}

pub mod openai_embed;

pub use openai_embed::OpenAiEmbedder;
