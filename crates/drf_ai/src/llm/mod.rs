use drf_core::error::AppError;

/// A hosted language model: system instructions plus a prompt in, text out.
pub trait Responder {
    fn generate(&self, system_instructions: &str, prompt: &str) -> Result<String, AppError>;
}

pub mod openai_llm;

pub use openai_llm::OpenAiResponder;
