pub mod client;
pub mod coach;
pub mod embeddings;
pub mod knowledge;
pub mod llm;
