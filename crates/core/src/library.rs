use crate::chunking::ChunkingConfig;
use crate::error::RagError;
use crate::extractor::sha256_hex;
use crate::index::{write_json_atomic, VectorIndex};
use crate::ingest::{ingest_pdf, ingest_pdf_bytes, IngestedSet};
use crate::models::{DocumentSummary, QueryResult};
use crate::retriever::Retriever;
use crate::traits::Embedder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

const THREAD_FILE_SUFFIX: &str = ".thread.json";

/// The indexed document attached to one chat thread.
#[derive(Debug)]
pub struct ThreadDocument {
    pub summary: DocumentSummary,
    pub index: Arc<VectorIndex>,
}

#[derive(Serialize, Deserialize)]
struct PersistedThread {
    thread_id: String,
    summary: DocumentSummary,
    index: VectorIndex,
}

/// Thread id → indexed document.
///
/// Ingesting into a thread builds a new index and swaps it in; queries that
/// already hold the previous index keep reading it undisturbed.
pub struct DocumentLibrary {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    threads: RwLock<HashMap<String, Arc<ThreadDocument>>>,
}

impl DocumentLibrary {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Result<Self, RagError> {
        chunking.validate()?;
        Ok(Self {
            embedder,
            chunking,
            threads: RwLock::new(HashMap::new()),
        })
    }

    pub async fn ingest_pdf_bytes(
        &self,
        thread_id: &str,
        bytes: &[u8],
        filename: &str,
    ) -> Result<DocumentSummary, RagError> {
        let set = ingest_pdf_bytes(bytes, filename, self.embedder.as_ref(), self.chunking).await?;
        Ok(self.install(thread_id, set))
    }

    pub async fn ingest_pdf_path(&self, thread_id: &str, path: &Path) -> Result<DocumentSummary, RagError> {
        let set = ingest_pdf(path, self.embedder.as_ref(), self.chunking).await?;
        Ok(self.install(thread_id, set))
    }

    /// Attaches an already built set, replacing whatever the thread had.
    pub fn install(&self, thread_id: &str, set: IngestedSet) -> DocumentSummary {
        let summary = set.summary.clone();
        let document = Arc::new(ThreadDocument {
            summary: set.summary,
            index: Arc::new(set.index),
        });

        let replaced = self.write().insert(thread_id.to_string(), document).is_some();
        info!(thread_id, replaced, chunks = summary.chunks, "thread document installed");
        summary
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn document(&self, thread_id: &str) -> Option<Arc<ThreadDocument>> {
        self.read().get(thread_id).cloned()
    }

    pub fn has_document(&self, thread_id: &str) -> bool {
        self.read().contains_key(thread_id)
    }

    pub fn summary(&self, thread_id: &str) -> Option<DocumentSummary> {
        self.document(thread_id).map(|document| document.summary.clone())
    }

    pub fn clear(&self, thread_id: &str) -> bool {
        self.write().remove(thread_id).is_some()
    }

    pub fn threads(&self) -> Vec<String> {
        let mut threads = self.read().keys().cloned().collect::<Vec<_>>();
        threads.sort();
        threads
    }

    /// Snapshot retriever for the thread; uninitialized when no document is attached.
    pub fn retriever(&self, thread_id: &str) -> Retriever {
        match self.document(thread_id) {
            Some(document) => Retriever::new(self.embedder.clone(), document.index.clone()),
            None => Retriever::uninitialized(self.embedder.clone()),
        }
    }

    pub async fn retrieve(&self, thread_id: &str, query_text: &str, k: usize) -> Result<QueryResult, RagError> {
        self.retriever(thread_id).retrieve(query_text, k).await
    }

    /// Writes one file per thread into `dir` and removes files of cleared threads.
    pub fn persist(&self, dir: &Path) -> Result<(), RagError> {
        fs::create_dir_all(dir)?;
        let snapshot = self
            .read()
            .iter()
            .map(|(thread_id, document)| (thread_id.clone(), document.clone()))
            .collect::<Vec<_>>();

        let mut keep = Vec::with_capacity(snapshot.len());
        for (thread_id, document) in snapshot {
            let file_name = thread_file_name(&thread_id);
            let record = PersistedThread {
                thread_id,
                summary: document.summary.clone(),
                index: document.index.as_ref().clone(),
            };
            write_json_atomic(&dir.join(&file_name), &record)?;
            keep.push(file_name);
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(THREAD_FILE_SUFFIX) && !keep.contains(&name) {
                debug!(file = %name, "removing stale thread index");
                fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }

    /// Loads every persisted thread in `dir`, replacing in-memory entries with the same id.
    pub fn restore(&self, dir: &Path) -> Result<usize, RagError> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut restored = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_thread_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(THREAD_FILE_SUFFIX));
            if !is_thread_file {
                continue;
            }

            let bytes = fs::read(&path)?;
            let record: PersistedThread = serde_json::from_slice(&bytes)?;
            let index = record.index.verified(&path)?;
            restored.push((
                record.thread_id,
                Arc::new(ThreadDocument {
                    summary: record.summary,
                    index: Arc::new(index),
                }),
            ));
        }

        let count = restored.len();
        self.write().extend(restored);
        info!(dir = %dir.display(), threads = count, "thread documents restored");
        Ok(count)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ThreadDocument>>> {
        self.threads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ThreadDocument>>> {
        self.threads.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn thread_file_name(thread_id: &str) -> String {
    format!("{}{THREAD_FILE_SUFFIX}", sha256_hex(thread_id.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TrigramHashEmbedder;
    use crate::test_support::{pdf_bytes, FailingEmbedder, LengthEmbedder};
    use tempfile::tempdir;

    fn library() -> DocumentLibrary {
        DocumentLibrary::new(Arc::new(LengthEmbedder::default()), ChunkingConfig::new(40, 10).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn ingest_attaches_document_to_thread() -> Result<(), Box<dyn std::error::Error>> {
        let library = library();
        let bytes = pdf_bytes(&["The relief valve opens at ten bar.", "Inspect the hose monthly."])?;

        let summary = library.ingest_pdf_bytes("thread-1", &bytes, "manual.pdf").await?;

        assert_eq!(summary.filename, "manual.pdf");
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.pages, 2);
        assert!(summary.chunks >= 2);
        assert!(library.has_document("thread-1"));
        assert!(!library.has_document("thread-2"));
        assert_eq!(library.summary("thread-1"), Some(summary));
        Ok(())
    }

    #[tokio::test]
    async fn thread_without_document_retrieves_nothing() {
        let result = library().retrieve("nobody", "question", 4).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn reingest_swaps_without_touching_old_snapshot() -> Result<(), Box<dyn std::error::Error>> {
        let library = library();
        library
            .ingest_pdf_bytes("thread-1", &pdf_bytes(&["Original content page"])?, "old.pdf")
            .await?;
        let before = library.document("thread-1").unwrap();

        library
            .ingest_pdf_bytes("thread-1", &pdf_bytes(&["Replacement content that is longer"])?, "new.pdf")
            .await?;
        let after = library.document("thread-1").unwrap();

        assert_eq!(before.summary.filename, "old.pdf");
        assert_eq!(after.summary.filename, "new.pdf");
        assert!(!Arc::ptr_eq(&before.index, &after.index));
        assert!(before.index.chunks().all(|chunk| chunk.text.contains("Original")));
        Ok(())
    }

    #[tokio::test]
    async fn failed_ingest_keeps_previous_document() -> Result<(), Box<dyn std::error::Error>> {
        let library = library();
        library
            .ingest_pdf_bytes("thread-1", &pdf_bytes(&["Kept content"])?, "kept.pdf")
            .await?;

        let result = library.ingest_pdf_bytes("thread-1", b"not a pdf", "bad.pdf").await;

        assert!(matches!(result, Err(RagError::Load(_))));
        assert_eq!(library.summary("thread-1").map(|summary| summary.filename).as_deref(), Some("kept.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn embedding_outage_during_query_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let library = DocumentLibrary::new(Arc::new(FailingEmbedder), ChunkingConfig::default())?;
        let set = IngestedSet {
            summary: DocumentSummary {
                filename: "x.pdf".to_string(),
                documents: 1,
                pages: 1,
                chunks: 0,
                ingested_at: chrono::Utc::now(),
            },
            index: VectorIndex::build(FailingEmbedder.id(), Vec::new(), Vec::new())?,
        };
        library.install("thread-1", set);

        // empty index: no embedding call, no error
        assert!(library.retrieve("thread-1", "q", 2).await?.is_empty());

        let populated = one_chunk_set(&FailingEmbedder);
        library.install("thread-1", populated);
        assert!(matches!(
            library.retrieve("thread-1", "q", 2).await,
            Err(RagError::Service(_))
        ));
        Ok(())
    }

    fn one_chunk_set(embedder: &dyn Embedder) -> IngestedSet {
        let chunk = crate::models::Chunk {
            chunk_id: "c".to_string(),
            document_id: "d".to_string(),
            chunk_index: 0,
            start: 0,
            length: 4,
            page_start: 1,
            page_end: 1,
            previous_chunk_id: None,
            next_chunk_id: None,
            text: "text".to_string(),
        };
        IngestedSet {
            summary: DocumentSummary {
                filename: "y.pdf".to_string(),
                documents: 1,
                pages: 1,
                chunks: 1,
                ingested_at: chrono::Utc::now(),
            },
            index: VectorIndex::build(embedder.id(), vec![chunk], vec![vec![4.0]]).unwrap(),
        }
    }

    #[tokio::test]
    async fn clear_and_list_threads() -> Result<(), Box<dyn std::error::Error>> {
        let library = library();
        let bytes = pdf_bytes(&["Shared content"])?;
        library.ingest_pdf_bytes("b-thread", &bytes, "b.pdf").await?;
        library.ingest_pdf_bytes("a-thread", &bytes, "a.pdf").await?;

        assert_eq!(library.threads(), vec!["a-thread".to_string(), "b-thread".to_string()]);
        assert!(library.clear("a-thread"));
        assert!(!library.clear("a-thread"));
        assert_eq!(library.threads(), vec!["b-thread".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn persist_and_restore_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let library = library();
        let bytes = pdf_bytes(&["Coolant must be replaced every two years of service."])?;
        library.ingest_pdf_bytes("thread/with:odd chars", &bytes, "coolant.pdf").await?;
        library.ingest_pdf_bytes("gone", &bytes, "gone.pdf").await?;
        library.persist(dir.path())?;

        library.clear("gone");
        library.persist(dir.path())?;

        let restored = self::library();
        assert_eq!(restored.restore(dir.path())?, 1);
        assert_eq!(restored.threads(), vec!["thread/with:odd chars".to_string()]);

        let original = library.retrieve("thread/with:odd chars", "what about coolant", 3).await?;
        let reloaded = restored.retrieve("thread/with:odd chars", "what about coolant", 3).await?;
        assert_eq!(original, reloaded);
        Ok(())
    }

    #[tokio::test]
    async fn restored_index_refuses_a_different_embedder() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let trigram = DocumentLibrary::new(
            Arc::new(TrigramHashEmbedder { dimensions: 1 }),
            ChunkingConfig::new(40, 10)?,
        )?;
        let bytes = pdf_bytes(&["Coolant must be replaced every two years of service."])?;
        trigram.ingest_pdf_bytes("t", &bytes, "coolant.pdf").await?;
        trigram.persist(dir.path())?;

        // same dimension (1), different vector space
        let restored = library();
        assert_eq!(restored.restore(dir.path())?, 1);

        let result = restored.retrieve("t", "coolant", 2).await;
        assert!(matches!(result, Err(RagError::Config(_))));
        Ok(())
    }

    #[test]
    fn restore_from_missing_dir_is_empty() {
        assert_eq!(library().restore(Path::new("/no/such/dir")).unwrap(), 0);
    }
}
