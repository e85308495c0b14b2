//! Length-based chunking of corpus documents.
//!
//! Windows are `chunk_size` characters long and advance by
//! `chunk_size - overlap`, so consecutive windows share `overlap` characters.
//! Each window is trimmed; windows shorter than `min_chunk_length` after
//! trimming are dropped. Documents are chunked independently.

use crate::types::{Chunk, ChunkingConfig, CorpusDocument};

/// Lazy chunk stream over a single document.
pub struct Chunker<'a> {
    document_id: &'a str,
    text: &'a str,
    config: ChunkingConfig,
    // (byte offset, char offset) of the next window, None once exhausted
    cursor: Option<(usize, usize)>,
    emitted: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(document_id: &'a str, text: &'a str, config: ChunkingConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self { document_id, text, config, cursor: Some((0, 0)), emitted: 0 })
    }

    fn emit(&mut self, window: &str, window_start: usize) -> Option<Chunk> {
        let trimmed = window.trim();
        let length = trimmed.chars().count();
        if length == 0 || length < self.config.min_chunk_length {
            return None;
        }
        let leading_bytes = window.len() - window.trim_start().len();
        let leading_chars = window[..leading_bytes].chars().count();
        let chunk = Chunk {
            id: format!("{}:{}", self.document_id, self.emitted),
            source_document_id: self.document_id.to_string(),
            text: trimmed.to_string(),
            start_offset: window_start + leading_chars,
            length,
        };
        self.emitted += 1;
        Some(chunk)
    }
}

impl Iterator for Chunker<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            let (start_byte, start_char) = self.cursor?;
            let rest = &self.text[start_byte..];
            if rest.is_empty() {
                self.cursor = None;
                return None;
            }
            let stride = self.config.chunk_size - self.config.overlap;
            let mut window_end = rest.len();
            let mut stride_end = rest.len();
            for (n, (offset, _)) in rest.char_indices().enumerate() {
                if n == stride {
                    stride_end = offset;
                }
                if n == self.config.chunk_size {
                    window_end = offset;
                    break;
                }
            }
            self.cursor = if window_end == rest.len() {
                None
            } else {
                Some((start_byte + stride_end, start_char + stride))
            };
            if let Some(chunk) = self.emit(&rest[..window_end], start_char) {
                return Some(chunk);
            }
        }
    }
}

/// Chunk every document in order, preserving document attribution.
pub fn chunk_corpus<'a>(
    documents: &'a [CorpusDocument],
    config: ChunkingConfig,
) -> Result<impl Iterator<Item = Chunk> + 'a, String> {
    config.validate()?;
    Ok(documents.iter().flat_map(move |doc| {
        Chunker::new(&doc.id, &doc.text, config).into_iter().flatten()
    }))
}
