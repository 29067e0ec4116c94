use crate::error::RagError;
use crate::models::{Chunk, IngestionOptions, SourceDocument};
use sha2::{Digest, Sha256};

/// Fixed-size character windows. Sizes count `char`s, not bytes or tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        IngestionOptions::default().into()
    }
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, RagError> {
        let config = Self {
            max_chars,
            overlap_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.overlap_chars >= self.max_chars {
            return Err(RagError::Config(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Start/length pairs (in chars) of every window over a text of `total` chars.
pub fn window_spans(total: usize, config: ChunkingConfig) -> Result<Vec<(usize, usize)>, RagError> {
    config.validate()?;

    let mut spans = Vec::new();
    let mut start = 0;
    while start < total {
        let length = config.max_chars.min(total - start);
        spans.push((start, length));
        if start + length == total {
            break;
        }
        start += config.stride();
    }

    Ok(spans)
}

/// Splits the document's joined page text into overlapping windows.
///
/// Windows holding only whitespace are dropped; indexes and neighbour links
/// run over the windows that remain.
pub fn chunk_document(
    document: &SourceDocument,
    config: ChunkingConfig,
    first_index: u64,
) -> Result<Vec<Chunk>, RagError> {
    let (text, page_starts) = document.joined_text();
    let chars: Vec<char> = text.chars().collect();

    let windows = window_spans(chars.len(), config)?
        .into_iter()
        .map(|(start, length)| (start, length, chars[start..start + length].iter().collect::<String>()))
        .filter(|(_, _, piece)| !piece.trim().is_empty())
        .collect::<Vec<_>>();

    let ids = windows
        .iter()
        .enumerate()
        .map(|(position, (start, _, piece))| {
            make_chunk_id(&document.document_id, first_index + position as u64, *start, piece)
        })
        .collect::<Vec<_>>();

    let chunks = windows
        .into_iter()
        .enumerate()
        .map(|(position, (start, length, piece))| {
            let last_char = start + length.saturating_sub(1);
            Chunk {
                chunk_id: ids[position].clone(),
                document_id: document.document_id.clone(),
                chunk_index: first_index + position as u64,
                start,
                length,
                page_start: page_at(&page_starts, start),
                page_end: page_at(&page_starts, last_char),
                previous_chunk_id: position.checked_sub(1).map(|previous| ids[previous].clone()),
                next_chunk_id: ids.get(position + 1).cloned(),
                text: piece,
            }
        })
        .collect();

    Ok(chunks)
}

fn page_at(page_starts: &[(usize, u32)], offset: usize) -> u32 {
    page_starts
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .map(|(_, number)| *number)
        .unwrap_or(0)
}

fn make_chunk_id(document_id: &str, index: u64, start: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update((start as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuilds the original text from ordered chunks by dropping each overlap.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered = 0usize;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.start + chunk.length);
    }

    text
}
