use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use drf_ai::client::DEFAULT_BASE_URL;
use drf_ai::embeddings::openai_embed::DEFAULT_EMBED_MODEL;
use drf_ai::llm::openai_llm::DEFAULT_CHAT_MODEL;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "drfcoach",
    about = "Build the DRF knowledge base and get coaching feedback on communication drafts"
)]
struct Cli {
    #[command(flatten)]
    api: ApiArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "DRF_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// API key for the hosted models
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Embedding model used to build and query the index
    #[arg(long, env = "DRF_EMBED_MODEL", default_value = DEFAULT_EMBED_MODEL)]
    pub embed_model: String,

    /// Chat model that writes the feedback
    #[arg(long, env = "DRF_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Per-request timeout for hosted calls
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a manuscript into chunks and write the chunk file
    Chunk {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 1000)]
        max_chars: usize,
        #[arg(long, default_value_t = 50)]
        min_segment_chars: usize,
    },
    /// Embed a chunk file and write the knowledge base snapshot
    Index {
        #[arg(long)]
        chunks: PathBuf,
        #[arg(long)]
        kb_dir: PathBuf,
        #[arg(long, default_value_t = 64)]
        batch_size: usize,
    },
    /// Print the chunks nearest to a query
    Retrieve {
        #[arg(long)]
        kb_dir: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 3)]
        k: usize,
        /// Emit hits as JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Analyze a draft (from --draft-file or stdin) and print the feedback
    Analyze {
        #[arg(long)]
        kb_dir: PathBuf,
        #[arg(long)]
        draft_file: Option<PathBuf>,
        /// Chunks of context to retrieve; capped at the knowledge base size
        #[arg(long, default_value_t = 5)]
        k: usize,
        /// Query the knowledge base with the draft instead of the fixed query
        #[arg(long, default_value_t = false)]
        query_from_draft: bool,
        /// Also print the retrieved context
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Chunk {
            input,
            output,
            max_chars,
            min_segment_chars,
        } => commands::chunk(&input, &output, max_chars, min_segment_chars),
        Command::Index {
            chunks,
            kb_dir,
            batch_size,
        } => commands::index(&cli.api, &chunks, kb_dir, batch_size),
        Command::Retrieve {
            kb_dir,
            query,
            k,
            json,
        } => commands::retrieve(&cli.api, kb_dir, &query, k, json),
        Command::Analyze {
            kb_dir,
            draft_file,
            k,
            query_from_draft,
            show_context,
        } => commands::analyze(
            &cli.api,
            kb_dir,
            draft_file.as_deref(),
            k,
            query_from_draft,
            show_context,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(details) = &e.details {
                eprintln!("  details: {details}");
            }
            ExitCode::FAILURE
        }
    }
}
