//! Plain-text chunk files.
//!
//! Two formats are used between the offline steps:
//! - the chunk file written by the chunker, one `--- CHUNK <n> ---` header per chunk;
//! - the chunk list stored next to the vector index, chunks joined by `\n---\n`.

use std::fs;
use std::path::Path;

use crate::error::AppError;

pub const CHUNK_LIST_DELIMITER: &str = "\n---\n";

pub fn render_chunk_file(chunks: &[String]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!("--- CHUNK {} ---\n", i + 1));
        out.push_str(chunk);
        out.push_str("\n\n");
    }
    out
}

/// Parse a chunk file. Text before the first header is ignored and empty
/// chunks are dropped.
pub fn parse_chunk_file(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in content.lines() {
        if is_chunk_header(line) {
            if let Some(lines) = current.take() {
                push_trimmed(&mut out, &lines);
            }
            current = Some(Vec::new());
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current {
        push_trimmed(&mut out, &lines);
    }
    out
}

fn push_trimmed(out: &mut Vec<String>, lines: &[&str]) {
    let text = lines.join("\n");
    let text = text.trim();
    if !text.is_empty() {
        out.push(text.to_string());
    }
}

fn is_chunk_header(line: &str) -> bool {
    let Some(rest) = line.trim_end().strip_prefix("--- CHUNK ") else {
        return false;
    };
    let Some(num) = rest.strip_suffix(" ---") else {
        return false;
    };
    !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit())
}

pub fn read_chunk_file(path: &Path) -> Result<Vec<String>, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::new("CHUNK_FILE_IO_FAILED", "Failed to read chunk file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    Ok(parse_chunk_file(&content))
}

pub fn write_chunk_file(path: &Path, chunks: &[String]) -> Result<(), AppError> {
    fs::write(path, render_chunk_file(chunks)).map_err(|e| {
        AppError::new("CHUNK_FILE_IO_FAILED", "Failed to write chunk file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

/// Join chunks for the snapshot chunk list.
///
/// A chunk that would make the delimiter ambiguous is refused; it could not
/// be read back in alignment with the index.
pub fn join_chunk_list(chunks: &[String]) -> Result<String, AppError> {
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.contains(CHUNK_LIST_DELIMITER) || chunk.ends_with("\n---") {
            return Err(AppError::new(
                "KB_CHUNK_DELIMITER_CONFLICT",
                "Chunk text contains the chunk list delimiter",
            )
            .with_details(format!("chunk={i}")));
        }
    }
    Ok(chunks.join(CHUNK_LIST_DELIMITER))
}

pub fn split_chunk_list(content: &str) -> Vec<String> {
    content
        .split(CHUNK_LIST_DELIMITER)
        .map(str::to_string)
        .collect()
}
