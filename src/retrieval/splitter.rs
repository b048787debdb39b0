//! Recursive character text splitting.
//!
//! Text is split on the coarsest separator that occurs in it (paragraphs,
//! then lines, then words, then grapheme clusters). Pieces are greedily
//! merged back into chunks of at most `chunk_size` characters, and each new
//! chunk starts with up to `chunk_overlap` characters carried over from the
//! end of the previous one.

use std::collections::VecDeque;

use unicode_segmentation::UnicodeSegmentation;

use super::loader::Document;
use crate::config::RetrievalConfig;
use crate::error::ConfigError;

/// Separators tried in order; the empty string means grapheme clusters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits documents into overlapping, size-bounded chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveTextSplitter {
    /// Creates a splitter. Requires `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "chunk_size",
                value: "0".to_string(),
                expected: "> 0",
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::OutOfRange {
                field: "chunk_overlap",
                value: chunk_overlap.to_string(),
                expected: "< chunk_size",
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Uses the sizes from a validated config.
    #[must_use]
    pub const fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size(),
            chunk_overlap: config.chunk_overlap(),
        }
    }

    /// Maximum characters per chunk.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits raw text.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    /// Splits each document, copying its metadata and adding `chunk_index`
    /// (position within that document).
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.text)
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| Document {
                        text,
                        metadata: doc.metadata.clone(),
                    }
                    .with_metadata("chunk_index", index))
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or_default();

        let pieces: Vec<&str> = if separator.is_empty() {
            text.graphemes(true).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                // A grapheme cluster longer than the chunk: fall back to chars
                chunks.extend(hard_split(piece, self.chunk_size));
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// Greedily joins pieces (each no longer than `chunk_size`) into chunks,
    /// keeping a tail of at most `chunk_overlap` characters between them.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>, total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0 && joined_len(&window, total) > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }
        push_chunk(&mut chunks, &window, separator);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn hard_split(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
