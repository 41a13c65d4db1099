
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::debug;

use super::{Chunk, Metadata};

/// Separators tried in order: paragraphs, lines, words, then raw characters
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Configuration for text chunking, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Maximum span shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// A contiguous piece of the input that fits within the chunk size
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Recursive character splitter.
///
/// Text is cut at the coarsest separator that produces pieces no longer
/// than `chunk_size`, and the pieces are packed greedily into windows. Each
/// window after the first begins with the tail pieces of its predecessor
/// (at most `chunk_overlap` characters). Separators stay attached to the
/// piece they end, so the windows always cover the input exactly.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split text into chunks that all carry a copy of `metadata`
    #[inline]
    pub fn split(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .split_spans(text)
            .into_iter()
            .filter_map(|span| text.get(span))
            .map(|piece| Chunk::new(piece, metadata.clone()))
            .collect();

        debug!(
            "Split {} bytes into {} chunks",
            text.len(),
            chunks.len()
        );
        chunks
    }

    /// Byte ranges of the chunks `split` would produce. Consecutive ranges
    /// may overlap; together they cover `0..text.len()`.
    #[inline]
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }

        let limit = self.config.chunk_size.max(1);
        let mut pieces = Vec::new();
        collect_pieces(text, 0..text.len(), &SEPARATORS, limit, &mut pieces);
        merge_pieces(&pieces, limit, self.config.chunk_overlap)
    }
}

/// Break `span` into pieces of at most `limit` characters, trying each
/// separator in turn
fn collect_pieces(
    text: &str,
    span: Range<usize>,
    separators: &[&str],
    limit: usize,
    out: &mut Vec<Piece>,
) {
    let Some(slice) = text.get(span.clone()) else {
        return;
    };
    let chars = slice.chars().count();
    if chars == 0 {
        return;
    }
    if chars <= limit {
        out.push(Piece {
            start: span.start,
            end: span.end,
            chars,
        });
        return;
    }

    let Some((separator, finer)) = separators.split_first() else {
        split_by_characters(slice, span.start, limit, out);
        return;
    };

    if separator.is_empty() {
        split_by_characters(slice, span.start, limit, out);
        return;
    }

    if !slice.contains(separator) {
        collect_pieces(text, span, finer, limit, out);
        return;
    }

    let mut piece_start = span.start;
    for (offset, matched) in slice.match_indices(separator) {
        let piece_end = span.start + offset + matched.len();
        collect_pieces(text, piece_start..piece_end, finer, limit, out);
        piece_start = piece_end;
    }
    if piece_start < span.end {
        collect_pieces(text, piece_start..span.end, finer, limit, out);
    }
}

/// Last resort: fixed-width character runs
fn split_by_characters(slice: &str, base: usize, limit: usize, out: &mut Vec<Piece>) {
    let mut start = 0;
    let mut chars = 0;
    for (offset, _) in slice.char_indices() {
        if chars == limit {
            out.push(Piece {
                start: base + start,
                end: base + offset,
                chars,
            });
            start = offset;
            chars = 0;
        }
        chars += 1;
    }
    if chars > 0 {
        out.push(Piece {
            start: base + start,
            end: base + slice.len(),
            chars,
        });
    }
}

/// Pack pieces into windows of at most `limit` characters, carrying up to
/// `overlap` characters of trailing pieces into the next window
fn merge_pieces(pieces: &[Piece], limit: usize, overlap: usize) -> Vec<Range<usize>> {
    let mut windows = Vec::new();
    let mut current: VecDeque<Piece> = VecDeque::new();
    let mut current_chars = 0;

    for piece in pieces {
        if current_chars + piece.chars > limit && !current.is_empty() {
            windows.push(window_span(&current));

            while current_chars > overlap
                || (current_chars > 0 && current_chars + piece.chars > limit)
            {
                let Some(front) = current.pop_front() else {
                    break;
                };
                current_chars -= front.chars;
            }
        }

        current.push_back(*piece);
        current_chars += piece.chars;
    }

    if !current.is_empty() {
        windows.push(window_span(&current));
    }

    windows
}

fn window_span(pieces: &VecDeque<Piece>) -> Range<usize> {
    let start = pieces.front().map_or(0, |p| p.start);
    let end = pieces.back().map_or(start, |p| p.end);
    start..end
}
