#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::article::Article;

/// Chunk sizing parameters, in characters.
///
/// Splitting is fully determined by these two values plus the input text:
/// re-running with identical parameters yields byte-identical chunks, which is
/// what makes re-vectorization idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound for a chunk before the overlap prefix is applied.
    pub max_chunk_size: usize,
    /// Trailing characters of the previous chunk prefixed to the next one.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap: 100,
        }
    }
}

/// A bounded span of one article's text, ready for embedding. Chunks are
/// transient: they live in the vector index (and its SQLite mirror), never as
/// standalone entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub article_fingerprint: String,
    pub index: u32,
    pub content: String,
}

/// Split an article's body into ordered, overlapping chunks.
///
/// An empty body produces zero chunks; callers treat that as a trivially
/// vectorized terminal state rather than an error.
pub fn split_article(article: &Article, config: &ChunkingConfig) -> Vec<TextChunk> {
    let pieces = split_text(&article.body, config);
    debug!(
        "split article {} into {} chunk(s)",
        article.fingerprint,
        pieces.len()
    );

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| TextChunk {
            article_fingerprint: article.fingerprint.clone(),
            index: index as u32,
            content,
        })
        .collect()
}

/// Deterministic text splitting: paragraphs are packed up to `max_chunk_size`
/// characters, oversized paragraphs fall back to sentence boundaries, and a
/// single sentence longer than the budget is hard-split by character count.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let max = config.max_chunk_size.max(1);

    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(paragraph) > max {
            for piece in split_oversized_paragraph(paragraph, max) {
                pack_piece(&mut chunks, &mut current, &piece, max, " ");
            }
        } else {
            pack_piece(&mut chunks, &mut current, paragraph, max, "\n\n");
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    if config.overlap > 0 && chunks.len() > 1 {
        apply_overlap(&mut chunks, config.overlap);
    }

    chunks
}

/// Append `piece` to the chunk under construction, flushing first when the
/// character budget would be exceeded.
fn pack_piece(
    chunks: &mut Vec<String>,
    current: &mut String,
    piece: &str,
    max: usize,
    separator: &str,
) {
    if !current.is_empty()
        && char_len(current) + char_len(separator) + char_len(piece) > max
    {
        chunks.push(std::mem::take(current));
    }

    if !current.is_empty() {
        current.push_str(separator);
    }
    current.push_str(piece);
}

/// Break an oversized paragraph into sentence-bounded pieces, hard-splitting
/// any single sentence that still exceeds the budget.
fn split_oversized_paragraph(paragraph: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();

    for sentence in split_sentences(paragraph) {
        if char_len(&sentence) > max {
            pieces.extend(hard_split(&sentence, max));
        } else {
            pieces.push(sentence);
        }
    }

    pieces
}

/// Simple sentence boundary detection on terminal punctuation.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_owned());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_owned());
    }

    sentences
}

/// Last-resort split into fixed-size character windows.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max)
        .map(|window| window.iter().collect::<String>().trim().to_owned())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Prefix each chunk after the first with the trailing `overlap` characters of
/// its predecessor, preserving cross-boundary context. Tails are taken from
/// the un-prefixed chunks so overlap never compounds.
fn apply_overlap(chunks: &mut [String], overlap: usize) {
    let tails: Vec<String> = chunks
        .iter()
        .take(chunks.len() - 1)
        .map(|chunk| char_tail(chunk, overlap).to_owned())
        .collect();

    for (chunk, tail) in chunks.iter_mut().skip(1).zip(tails) {
        if !tail.is_empty() {
            *chunk = format!("{tail} {chunk}");
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, respecting char boundaries.
fn char_tail(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if len <= n {
        return s;
    }
    s.char_indices()
        .nth(len - n)
        .map_or(s, |(byte_index, _)| &s[byte_index..])
}
