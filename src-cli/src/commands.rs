use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drf_ai::client::ApiClient;
use drf_ai::coach::{Coach, CoachOptions, QueryStrategy};
use drf_ai::embeddings::OpenAiEmbedder;
use drf_ai::knowledge::{build_snapshot, BuildOptions, KnowledgeBase};
use drf_ai::llm::OpenAiResponder;
use drf_core::chunking::{Chunker, ChunkerOptions};
use drf_core::error::AppError;
use drf_core::formats::{read_chunk_file, write_chunk_file};
use drf_core::snapshot::{SnapshotSaveInput, SnapshotStore};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::ApiArgs;

const PREVIEW_CHARS: usize = 300;

fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("KB_SNAPSHOT_WRITE_FAILED", "Failed to format time").with_details(e.to_string()))
}

fn api_client(api: &ApiArgs) -> Result<ApiClient, AppError> {
    let key = api.api_key.as_deref().ok_or_else(|| {
        AppError::new(
            "AI_CREDENTIAL_MISSING",
            "OPENAI_API_KEY must be set (or pass --api-key)",
        )
    })?;
    ApiClient::with_timeout(&api.api_base_url, key, Duration::from_secs(api.timeout_secs))
}

fn open_knowledge_base(api: &ApiArgs, kb_dir: PathBuf) -> Result<KnowledgeBase<OpenAiEmbedder>, AppError> {
    let client = api_client(api)?;
    let embedder = OpenAiEmbedder::new(client, api.embed_model.clone());
    let (kb, _manifest) = KnowledgeBase::open(embedder, &SnapshotStore::open(kb_dir))?;
    Ok(kb)
}

pub fn chunk(input: &Path, output: &Path, max_chars: usize, min_segment_chars: usize) -> Result<(), AppError> {
    let text = fs::read_to_string(input).map_err(|e| {
        AppError::new("CHUNK_FILE_IO_FAILED", "Failed to read manuscript")
            .with_details(format!("path={}; err={}", input.display(), e))
    })?;
    let chunker = Chunker::new(ChunkerOptions {
        max_chars,
        min_segment_chars,
    })?;
    let chunks: Vec<String> = chunker.chunks(&text).collect();
    write_chunk_file(output, &chunks)?;

    tracing::info!(chunks = chunks.len(), output = %output.display(), "chunking complete");
    println!("{} chunks written to {}", chunks.len(), output.display());
    Ok(())
}

pub fn index(api: &ApiArgs, chunks_path: &Path, kb_dir: PathBuf, batch_size: usize) -> Result<(), AppError> {
    let chunks = read_chunk_file(chunks_path)?;
    tracing::info!(chunks = chunks.len(), path = %chunks_path.display(), "loaded chunks");

    let client = api_client(api)?;
    let embedder = OpenAiEmbedder::new(client, api.embed_model.clone());
    let snapshot = build_snapshot(&embedder, chunks, BuildOptions { batch_size })?;

    let store = SnapshotStore::open(kb_dir);
    let manifest = store.save(
        &snapshot,
        SnapshotSaveInput {
            embed_model: api.embed_model.clone(),
            built_at: now_rfc3339_utc()?,
        },
    )?;
    println!(
        "indexed {} chunks ({} dims) into {}",
        manifest.chunk_count,
        manifest.dims,
        store.root().display()
    );
    Ok(())
}

pub fn retrieve(api: &ApiArgs, kb_dir: PathBuf, query: &str, k: usize, json: bool) -> Result<(), AppError> {
    let kb = open_knowledge_base(api, kb_dir)?;
    let hits = kb.retrieve_hits(query, k)?;

    if json {
        let out = serde_json::to_string_pretty(&hits).map_err(|e| {
            AppError::new("CLI_OUTPUT_FAILED", "Failed to encode hits").with_details(e.to_string())
        })?;
        println!("{out}");
        return Ok(());
    }

    for (j, hit) in hits.iter().enumerate() {
        println!(
            "--- Context Chunk {} (id={}, distance={:.4}) ---",
            j + 1,
            hit.id,
            hit.distance
        );
        println!("{}", preview(&hit.text, PREVIEW_CHARS));
    }
    Ok(())
}

pub fn analyze(
    api: &ApiArgs,
    kb_dir: PathBuf,
    draft_file: Option<&Path>,
    k: usize,
    query_from_draft: bool,
    show_context: bool,
) -> Result<(), AppError> {
    let draft = read_draft(draft_file)?;
    // Checked here too so an empty draft never needs a credential or a snapshot.
    if draft.trim().is_empty() {
        return Err(AppError::new(
            "INPUT_EMPTY",
            "Please enter a communication draft to analyze",
        ));
    }

    let kb = open_knowledge_base(api, kb_dir)?;
    let k = context_k(k, kb.snapshot().len());
    let responder = OpenAiResponder::new(api_client(api)?, api.chat_model.clone());
    let mut opts = CoachOptions {
        k,
        ..CoachOptions::default()
    };
    if query_from_draft {
        opts.query = QueryStrategy::FromDraft;
    }
    let coach = Coach::new(kb, responder, opts);

    let report = coach.analyze_report(&draft)?;
    if show_context {
        println!("--- Retrieved Context ---\n{}\n", report.context);
        println!("--- Feedback ---");
    }
    println!("{}", report.feedback);
    Ok(())
}

/// Small knowledge bases still get feedback: analysis uses every chunk
/// when fewer than `requested` exist.
fn context_k(requested: usize, available: usize) -> usize {
    if requested > available {
        tracing::warn!(requested, available, "knowledge base has fewer chunks than k; using all");
        return available;
    }
    requested
}

fn read_draft(draft_file: Option<&Path>) -> Result<String, AppError> {
    match draft_file {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            AppError::new("INPUT_READ_FAILED", "Failed to read draft file")
                .with_details(format!("path={}; err={}", path.display(), e))
        }),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map_err(|e| {
                AppError::new("INPUT_READ_FAILED", "Failed to read draft from stdin")
                    .with_details(e.to_string())
            })?;
            Ok(buf)
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
