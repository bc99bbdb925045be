use crate::document::Document;
use anyhow::Result;

/// Default maximum chunk length, in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Default number of characters shared by consecutive chunks
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Break points, coarsest first: paragraph, line, sentence, word.
/// Anything finer is a raw character cut.
const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Identifier of the document this chunk belongs to
    pub document_id: String,
    /// 1-based number of the page the chunk was cut from
    pub page_number: usize,
    /// Position of this chunk in the document-wide chunk sequence
    pub chunk_index: usize,
    /// Starting character offset of this chunk inside its page
    pub start_position: usize,
}

impl TextChunk {
    /// Length of the chunk in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits text into bounded, overlapping chunks, preferring to break on
/// paragraphs, then lines, then sentences, then words, then characters.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        RecursiveCharacterSplitter {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecursiveCharacterSplitter {
    /// Create a splitter; the overlap must be strictly smaller than the chunk size
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        anyhow::ensure!(chunk_size > 0, "chunk size must be greater than zero");
        anyhow::ensure!(
            chunk_overlap < chunk_size,
            "chunk overlap ({}) must be smaller than chunk size ({})",
            chunk_overlap,
            chunk_size
        );

        Ok(RecursiveCharacterSplitter {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        })
    }

    /// Split a single text into `(start_char_offset, chunk_text)` pairs.
    ///
    /// Each chunk is at most `chunk_size` characters. A chunk following
    /// another one starts `chunk_overlap` characters before the previous
    /// chunk's end, so the two share exactly that many characters.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        // Byte offset of every char, plus the end of the string
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;

        let mut pieces = Vec::new();
        let mut start = 0;

        while start < total {
            let end = self.find_break(text, &offsets, start, total);
            let piece = &text[offsets[start]..offsets[end]];
            if !piece.trim().is_empty() {
                pieces.push((start, piece.to_string()));
            }

            if end == total {
                break;
            }

            // find_break guarantees end - start > chunk_overlap
            start = end - self.chunk_overlap;
        }

        pieces
    }

    /// Split every page of a document, numbering chunks document-wide
    pub fn split_document(&self, document: &Document) -> Vec<TextChunk> {
        let mut chunks = Vec::new();

        for page in &document.pages {
            for (start_position, text) in self.split_text(&page.text) {
                chunks.push(TextChunk {
                    text,
                    document_id: document.document_id.clone(),
                    page_number: page.number,
                    chunk_index: chunks.len(),
                    start_position,
                });
            }
        }

        chunks
    }

    /// Pick the end (exclusive, in chars) of the chunk starting at `start`.
    fn find_break(&self, text: &str, offsets: &[usize], start: usize, total: usize) -> usize {
        let limit = (start + self.chunk_size).min(total);
        if limit == total {
            return total;
        }

        // A separator break must keep the chunk at least half full and
        // longer than the overlap, otherwise we would barely advance.
        let min_fill = (self.chunk_size / 2).max(self.chunk_overlap + 1);
        let window = &text[offsets[start]..offsets[limit]];

        for separator in &self.separators {
            if let Some(pos) = window.rfind(separator.as_str()) {
                let end_byte = offsets[start] + pos + separator.len();
                let end = offsets.binary_search(&end_byte).unwrap_or_else(|i| i);
                if end - start >= min_fill {
                    return end;
                }
            }
        }

        limit
    }
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}
