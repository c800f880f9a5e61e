//! Paragraph chunking for manuscripts.
//!
//! Text is split on blank-line boundaries (two or more consecutive `\n`),
//! short segments such as page numbers and running headers are dropped, and
//! the survivors are merged greedily into chunks joined by a blank line.
//! The size cap is soft: a single segment longer than the cap is emitted as
//! its own chunk, unsplit.

use std::borrow::Cow;

use crate::error::AppError;

const SEPARATOR: &str = "\n\n";
const SEPARATOR_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerOptions {
    /// Merged chunks stay strictly below this many chars.
    pub max_chars: usize,
    /// Segments of this many chars or fewer are treated as noise.
    pub min_segment_chars: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            min_segment_chars: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    opts: ChunkerOptions,
}

impl Chunker {
    pub fn new(opts: ChunkerOptions) -> Result<Self, AppError> {
        if opts.max_chars == 0 {
            return Err(AppError::new(
                "CHUNK_CONFIG_INVALID",
                "Chunk size cap must be greater than zero",
            ));
        }
        Ok(Self { opts })
    }

    pub fn options(&self) -> ChunkerOptions {
        self.opts
    }

    /// Lazily chunk `text`. Calling this again restarts from the beginning.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        let text = if text.contains('\r') {
            Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
        } else {
            Cow::Borrowed(text)
        };
        Chunks {
            text,
            pos: 0,
            opts: self.opts,
            carry: None,
        }
    }
}

/// Chunk `text` with the default noise filter and the given cap.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<String>, AppError> {
    let chunker = Chunker::new(ChunkerOptions {
        max_chars,
        ..ChunkerOptions::default()
    })?;
    Ok(chunker.chunks(text).collect())
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: Cow<'a, str>,
    pos: usize,
    opts: ChunkerOptions,
    // Segment that overflowed the previous chunk; it opens the next one.
    carry: Option<(String, usize)>,
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let (mut buf, mut buf_len) = self.carry.take().unwrap_or_default();

        while let Some((start, end)) = next_segment(&self.text, &mut self.pos) {
            let seg = &self.text[start..end];
            let seg_len = seg.chars().count();
            if seg_len <= self.opts.min_segment_chars {
                continue;
            }
            if buf.is_empty() {
                buf.push_str(seg);
                buf_len = seg_len;
                continue;
            }
            if buf_len + SEPARATOR_CHARS + seg_len >= self.opts.max_chars {
                self.carry = Some((seg.to_string(), seg_len));
                return Some(buf);
            }
            buf.push_str(SEPARATOR);
            buf.push_str(seg);
            buf_len += SEPARATOR_CHARS + seg_len;
        }

        if buf.is_empty() {
            None
        } else {
            Some(buf)
        }
    }
}

/// Advance past the next blank-line delimited segment and return its trimmed
/// byte range. Whitespace-only segments are skipped.
fn next_segment(text: &str, pos: &mut usize) -> Option<(usize, usize)> {
    while *pos < text.len() {
        let start = *pos;
        let rest = &text[start..];
        let (raw_len, advance) = match rest.find(SEPARATOR) {
            Some(i) => {
                let newlines = rest[i..].bytes().take_while(|b| *b == b'\n').count();
                (i, i + newlines)
            }
            None => (rest.len(), rest.len()),
        };
        *pos = start + advance;

        let raw = &rest[..raw_len];
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lead = raw.len() - raw.trim_start().len();
        return Some((start + lead, start + lead + trimmed.len()));
    }
    None
}
