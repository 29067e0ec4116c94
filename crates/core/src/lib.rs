pub mod chunking;
pub mod compose;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod library;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod retriever;
pub mod retry;
pub mod session;
pub mod tools;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{chunk_document, reassemble, window_spans, ChunkingConfig};
pub use compose::compose_prompt;
pub use embeddings::{TrigramHashEmbedder, DEFAULT_OFFLINE_DIMENSIONS};
pub use error::{LoadError, RagError, ServiceError, ToolError};
pub use extractor::{extract_page_texts, load_pdf, load_pdf_bytes, LopdfExtractor, PdfExtractor};
pub use index::VectorIndex;
pub use ingest::{discover_pdf_files, ingest_folder, ingest_pdf, ingest_pdf_bytes, IngestedSet};
pub use library::{DocumentLibrary, ThreadDocument};
pub use models::{
    Chunk, DocumentSummary, IngestionOptions, PageText, QueryResult, ScoredChunk, SourceDocument,
};
pub use orchestrator::{Answer, ChatCoordinator};
pub use providers::{GeminiClient, GeminiConfig};
pub use retriever::Retriever;
pub use retry::RetryPolicy;
pub use session::{ChatMessage, ChatSession, Role, SessionStore};
pub use tools::{RetrievalTool, Tool, ToolRegistry};
pub use traits::{ChatModel, Embedder};
