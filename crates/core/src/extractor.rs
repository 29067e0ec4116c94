use crate::error::LoadError;
use crate::models::{PageText, SourceDocument};
use chrono::Utc;
use lopdf::Document;
use sha2::{Digest, Sha256};
use std::path::Path;

pub trait PdfExtractor {
    fn extract_pages(&self, bytes: &[u8], label: &str) -> Result<Vec<PageText>, LoadError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8], label: &str) -> Result<Vec<PageText>, LoadError> {
        let document =
            Document::load_mem(bytes).map_err(|error| LoadError::PdfParse(format!("{label}: {error}")))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| LoadError::PdfParse(format!("{label} page {page_no}: {error}")))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(LoadError::NoText(label.to_string()));
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, LoadError> {
    let bytes = read_file(path)?;
    LopdfExtractor.extract_pages(&bytes, &path.display().to_string())
}

/// Loads a PDF from disk into an immutable [`SourceDocument`].
pub fn load_pdf(path: &Path) -> Result<SourceDocument, LoadError> {
    let bytes = read_file(path)?;
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LoadError::MissingFileName(path.display().to_string()))?;

    build_document(&LopdfExtractor, &bytes, title, &path.to_string_lossy())
}

/// Loads an uploaded PDF that never touched the file system.
pub fn load_pdf_bytes(bytes: &[u8], filename: &str) -> Result<SourceDocument, LoadError> {
    let filename = filename.trim();
    if filename.is_empty() {
        return Err(LoadError::MissingFileName("upload".to_string()));
    }

    build_document(&LopdfExtractor, bytes, filename, &format!("upload://{filename}"))
}

pub fn build_document(
    extractor: &impl PdfExtractor,
    bytes: &[u8],
    title: &str,
    source_path: &str,
) -> Result<SourceDocument, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::PdfParse(format!("{source_path}: no bytes received")));
    }

    let pages = extractor.extract_pages(bytes, source_path)?;

    Ok(SourceDocument {
        document_id: sha256_hex(source_path.as_bytes()),
        title: title.to_string(),
        source_path: source_path.to_string(),
        checksum: sha256_hex(bytes),
        ingested_at: Utc::now(),
        pages,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
