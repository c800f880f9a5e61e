use drf_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::knowledge::Retriever;
use crate::llm::Responder;

mod prompts;

pub use prompts::{coach_instructions, compose};

pub const DEFAULT_RETRIEVAL_QUERY: &str =
    "Summarize the core principles of the Digital Resonance Framework and Digital Emotional Intelligence.";

/// How the coach phrases its knowledge base query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Same query for every draft.
    Fixed(String),
    /// The trimmed draft itself is the query.
    FromDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachOptions {
    pub k: usize,
    pub query: QueryStrategy,
}

impl Default for CoachOptions {
    fn default() -> Self {
        Self {
            k: 5,
            query: QueryStrategy::Fixed(DEFAULT_RETRIEVAL_QUERY.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachReport {
    pub query: String,
    pub context: String,
    pub feedback: String,
}

/// Retrieves DRF knowledge for a draft and asks the responder for feedback.
#[derive(Debug, Clone)]
pub struct Coach<R, L> {
    retriever: R,
    responder: L,
    instructions: String,
    opts: CoachOptions,
}

impl<R: Retriever, L: Responder> Coach<R, L> {
    pub fn new(retriever: R, responder: L, opts: CoachOptions) -> Self {
        Self {
            retriever,
            responder,
            instructions: coach_instructions().to_string(),
            opts,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    pub fn responder(&self) -> &L {
        &self.responder
    }

    pub fn analyze(&self, draft: &str) -> Result<String, AppError> {
        self.analyze_report(draft).map(|report| report.feedback)
    }

    /// Like [`Coach::analyze`], also returning the query and retrieved context.
    pub fn analyze_report(&self, draft: &str) -> Result<CoachReport, AppError> {
        if draft.trim().is_empty() {
            return Err(AppError::new(
                "INPUT_EMPTY",
                "Please enter a communication draft to analyze",
            ));
        }

        let query = match &self.opts.query {
            QueryStrategy::Fixed(q) => q.clone(),
            QueryStrategy::FromDraft => draft.trim().to_string(),
        };
        let context = self.retriever.retrieve(&query, self.opts.k)?;
        let prompt = compose(&self.instructions, &context, draft);

        tracing::debug!(k = self.opts.k, prompt_chars = prompt.len(), "sending analysis request");
        let feedback = self.responder.generate(&self.instructions, &prompt)?;
        if feedback.trim().is_empty() {
            return Err(AppError::new(
                "AI_GENERATE_FAILED",
                "Responder returned empty feedback",
            ));
        }

        Ok(CoachReport {
            query,
            context,
            feedback,
        })
    }
}
