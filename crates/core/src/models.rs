use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator inserted between page texts before chunking.
pub const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
    pub pages: Vec<PageText>,
}

impl SourceDocument {
    /// Page texts joined with [`PAGE_SEPARATOR`], plus the char offset where each page starts.
    pub fn joined_text(&self) -> (String, Vec<(usize, u32)>) {
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(self.pages.len());
        let mut offset = 0usize;

        for (position, page) in self.pages.iter().enumerate() {
            if position > 0 {
                text.push_str(PAGE_SEPARATOR);
                offset += PAGE_SEPARATOR.chars().count();
            }
            page_starts.push((offset, page.number));
            text.push_str(&page.text);
            offset += page.text.chars().count();
        }

        (text, page_starts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: u64,
    /// Offset in chars into the joined document text.
    pub start: usize,
    /// Length in chars.
    pub length: usize,
    pub page_start: u32,
    pub page_end: u32,
    pub previous_chunk_id: Option<String>,
    pub next_chunk_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Closest first, at most `k` entries.
pub type QueryResult = Vec<ScoredChunk>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
        }
    }
}
