
use tracing::debug;

use crate::{CourseRagError, Result};

pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 400;

/// Configuration for sentence-aligned chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters; only a single oversized sentence may exceed it
    pub max_chunk_length: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
        }
    }
}

/// Split text into sentence-aligned chunks of at most `max_chunk_length` characters.
///
/// Sentences are accumulated greedily and joined with a single space. A sentence that
/// is longer than the limit on its own becomes its own chunk instead of being cut.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    let max_length = config.max_chunk_length;
    if max_length == 0 {
        return Err(CourseRagError::Chunking(
            "Maximum chunk length must be greater than zero".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_length = 0;

    for sentence in split_sentences(text) {
        let sentence_length = sentence.chars().count();

        if current_length > 0 && current_length + 1 + sentence_length > max_length {
            chunks.push(std::mem::take(&mut current));
            current_length = 0;
        }

        if current_length > 0 {
            current.push(' ');
            current_length += 1;
        }
        current.push_str(sentence);
        current_length += sentence_length;
    }

    if current_length > 0 {
        chunks.push(current);
    }

    debug!(
        "Split {} characters into {} chunks (max {})",
        text.chars().count(),
        chunks.len(),
        max_length
    );

    Ok(chunks)
}

/// Split on terminal punctuation (`.`, `?`, `!`) followed by whitespace.
/// The whitespace run is the separator and is dropped; empty pieces are skipped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }

        let end = index + c.len_utf8();
        let mut next_start = end;
        while let Some(&(ws_index, ws)) = chars.peek() {
            if !ws.is_whitespace() {
                break;
            }
            next_start = ws_index + ws.len_utf8();
            chars.next();
        }

        if next_start > end {
            push_sentence(&mut sentences, &text[start..end]);
            start = next_start;
        }
    }

    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
}
