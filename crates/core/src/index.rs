use crate::error::RagError;
use crate::models::{Chunk, QueryResult, ScoredChunk};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const FORMAT_VERSION: u32 = 2;

/// The only metric the index speaks. Stored with the blob so a reload can
/// refuse data ranked under anything else.
pub const METRIC: &str = "euclidean";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Exact nearest-neighbour index over chunk embeddings.
///
/// Read-only once built. Entries keep insertion order, which breaks ties
/// between equal distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    format_version: u32,
    metric: String,
    /// Identity of the embedder that produced the vectors; queries must use the same one.
    embedder_id: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn empty() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            metric: METRIC.to_string(),
            embedder_id: String::new(),
            dimension: 0,
            entries: Vec::new(),
        }
    }

    pub fn build(
        embedder_id: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, RagError> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Config(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension || dimension == 0 {
                return Err(RagError::Config(format!(
                    "embedding {position} has dimension {} but the index expects {dimension}",
                    vector.len()
                )));
            }
            if vector.iter().any(|value| !value.is_finite()) {
                return Err(RagError::Config(format!(
                    "embedding {position} contains a non-finite component"
                )));
            }
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(Self {
            format_version: FORMAT_VERSION,
            metric: METRIC.to_string(),
            embedder_id: embedder_id.into(),
            dimension,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedder_id(&self) -> &str {
        &self.embedder_id
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub fn query(&self, vector: &[f32], k: usize) -> Result<QueryResult, RagError> {
        if k == 0 {
            return Err(RagError::Config("k must be at least 1".to_string()));
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(RagError::Config(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, euclidean(vector, &entry.vector)))
            .collect::<Vec<_>>();

        // stable: equal distances keep insertion order
        scored.sort_by(|left, right| left.1.total_cmp(&right.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, distance)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Writes the index next to `path` and renames it into place.
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, RagError> {
        let bytes = fs::read(path)?;
        let index: Self = serde_json::from_slice(&bytes)?;
        index.verified(path)
    }

    /// Rejects deserialized data this version cannot rank correctly.
    pub(crate) fn verified(self, path: &Path) -> Result<Self, RagError> {
        if self.format_version != FORMAT_VERSION {
            return Err(RagError::Storage(format!(
                "{} has index format {}, expected {FORMAT_VERSION}",
                path.display(),
                self.format_version
            )));
        }
        if self.metric != METRIC {
            return Err(RagError::Storage(format!(
                "{} was built with metric {}, expected {METRIC}",
                path.display(),
                self.metric
            )));
        }
        if !self.entries.is_empty() && self.embedder_id.is_empty() {
            return Err(RagError::Storage(format!(
                "{} does not record which embedder built it",
                path.display()
            )));
        }
        if self.entries.iter().any(|entry| entry.vector.len() != self.dimension) {
            return Err(RagError::Storage(format!(
                "{} has vectors that do not match dimension {}",
                path.display(),
                self.dimension
            )));
        }
        Ok(self)
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::empty()
    }
}

fn euclidean(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt()
}

/// Stages `value` in a uniquely named file beside `path` and renames it into place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RagError> {
    let parent = match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staging = NamedTempFile::new_in(parent)?;
    staging.write_all(&serde_json::to_vec(value)?)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|error| error.error)?;
    Ok(())
}
