use crate::chunking::{chunk_document, ChunkingConfig};
use crate::embeddings::check_batch;
use crate::error::{LoadError, RagError};
use crate::extractor::{load_pdf, load_pdf_bytes};
use crate::index::VectorIndex;
use crate::models::{Chunk, DocumentSummary, SourceDocument};
use crate::traits::Embedder;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// A fully built index plus what went into it.
#[derive(Debug, Clone)]
pub struct IngestedSet {
    pub summary: DocumentSummary,
    pub index: VectorIndex,
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub async fn ingest_pdf(
    path: &Path,
    embedder: &dyn Embedder,
    config: ChunkingConfig,
) -> Result<IngestedSet, RagError> {
    config.validate()?;
    let document = load_pdf(path)?;
    let filename = document.title.clone();
    build_index(vec![document], &filename, embedder, config).await
}

pub async fn ingest_pdf_bytes(
    bytes: &[u8],
    filename: &str,
    embedder: &dyn Embedder,
    config: ChunkingConfig,
) -> Result<IngestedSet, RagError> {
    config.validate()?;
    let document = load_pdf_bytes(bytes, filename)?;
    build_index(vec![document], filename, embedder, config).await
}

/// Ingests every PDF under `folder`. One unreadable file fails the whole set.
pub async fn ingest_folder(
    folder: &Path,
    embedder: &dyn Embedder,
    config: ChunkingConfig,
) -> Result<IngestedSet, RagError> {
    config.validate()?;
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(LoadError::NoDocuments(folder.display().to_string()).into());
    }

    let documents = files
        .iter()
        .map(|path| load_pdf(path))
        .collect::<Result<Vec<_>, _>>()?;

    let label = folder
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| folder.display().to_string());

    build_index(documents, &label, embedder, config).await
}

/// Chunks, embeds and indexes already loaded documents.
pub async fn build_index(
    documents: Vec<SourceDocument>,
    label: &str,
    embedder: &dyn Embedder,
    config: ChunkingConfig,
) -> Result<IngestedSet, RagError> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for document in &documents {
        let next_index = chunks.len() as u64;
        chunks.extend(chunk_document(document, config, next_index)?);
    }

    let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed_batch(&texts).await?
    };
    check_batch("embedder", texts.len(), &vectors)?;

    let summary = DocumentSummary {
        filename: label.to_string(),
        documents: documents.len(),
        pages: documents.iter().map(|document| document.pages.len()).sum(),
        chunks: chunks.len(),
        ingested_at: Utc::now(),
    };
    let index = VectorIndex::build(embedder.id(), chunks, vectors)?;

    info!(
        filename = %summary.filename,
        documents = summary.documents,
        pages = summary.pages,
        chunks = summary.chunks,
        dimension = index.dimension(),
        embedder = %index.embedder_id(),
        "document set indexed"
    );

    Ok(IngestedSet { summary, index })
}
