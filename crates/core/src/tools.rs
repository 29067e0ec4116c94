use crate::error::ToolError;
use crate::library::DocumentLibrary;
use crate::retriever::Retriever;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RETRIEVAL_TOOL_NAME: &str = "rag_tool";
pub const NO_DOCUMENT_MESSAGE: &str = "No document indexed for this chat. Upload a PDF first.";
pub const DEFAULT_TOP_K: usize = 4;

/// Anything an agent loop can call by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

#[derive(Debug, Deserialize)]
struct RetrievalArgs {
    query: String,
    thread_id: String,
}

/// Looks up context in the PDF attached to a chat thread.
pub struct RetrievalTool {
    library: Arc<DocumentLibrary>,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(library: Arc<DocumentLibrary>, top_k: usize) -> Self {
        Self { library, top_k }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVAL_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Retrieve relevant information from the uploaded PDF for this chat thread. \
         Always include the thread_id when calling this tool."
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: RetrievalArgs =
            serde_json::from_value(args).map_err(|error| ToolError::InvalidArguments {
                tool: RETRIEVAL_TOOL_NAME.to_string(),
                details: error.to_string(),
            })?;

        let Some(document) = self.library.document(&args.thread_id) else {
            return Ok(json!({
                "error": NO_DOCUMENT_MESSAGE,
                "query": args.query,
            }));
        };

        let hits = Retriever::new(self.library.embedder(), document.index.clone())
            .retrieve(&args.query, self.top_k)
            .await
            .map_err(|source| ToolError::Failed {
                tool: RETRIEVAL_TOOL_NAME.to_string(),
                source,
            })?;

        let context = hits.iter().map(|hit| hit.chunk.text.clone()).collect::<Vec<_>>();
        let metadata = hits
            .iter()
            .map(|hit| {
                json!({
                    "chunk_id": hit.chunk.chunk_id,
                    "page_start": hit.chunk.page_start,
                    "page_end": hit.chunk.page_end,
                    "start": hit.chunk.start,
                    "distance": hit.distance,
                })
            })
            .collect::<Vec<_>>();

        Ok(json!({
            "query": args.query,
            "context": context,
            "metadata": metadata,
            "source_file": document.summary.filename,
        }))
    }
}

/// Dispatches tool calls by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// `(name, description)` pairs for advertising the tools to a model.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|tool| (tool.name().to_string(), tool.description().to_string()))
            .collect()
    }

    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingConfig;
    use crate::index::VectorIndex;
    use crate::ingest::IngestedSet;
    use crate::models::{Chunk, DocumentSummary};
    use crate::test_support::{FailingEmbedder, LengthEmbedder};
    use crate::traits::Embedder;

    fn chunk(id: &str, text: &str, page: u32) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            document_id: "doc-1".to_string(),
            chunk_index: 0,
            start: 0,
            length: text.chars().count(),
            page_start: page,
            page_end: page,
            previous_chunk_id: None,
            next_chunk_id: None,
            text: text.to_string(),
        }
    }

    fn library_with(embedder: Arc<dyn Embedder>) -> Arc<DocumentLibrary> {
        let embedder_id = embedder.id();
        let library = DocumentLibrary::new(embedder, ChunkingConfig::default()).unwrap();
        let chunks = vec![chunk("short", "abc", 1), chunk("long", "abcdefghij", 2)];
        library.install(
            "thread-1",
            IngestedSet {
                summary: DocumentSummary {
                    filename: "manual.pdf".to_string(),
                    documents: 1,
                    pages: 2,
                    chunks: 2,
                    ingested_at: chrono::Utc::now(),
                },
                index: VectorIndex::build(embedder_id, chunks, vec![vec![3.0], vec![10.0]]).unwrap(),
            },
        );
        Arc::new(library)
    }

    #[tokio::test]
    async fn retrieval_tool_returns_context_and_source() {
        let tool = RetrievalTool::new(library_with(Arc::new(LengthEmbedder::default())), 1);

        let output = tool
            .invoke(json!({ "query": "abcdefghi", "thread_id": "thread-1" }))
            .await
            .unwrap();

        assert_eq!(output["query"], "abcdefghi");
        assert_eq!(output["context"], json!(["abcdefghij"]));
        assert_eq!(output["metadata"][0]["chunk_id"], "long");
        assert_eq!(output["metadata"][0]["page_start"], 2);
        assert_eq!(output["source_file"], "manual.pdf");
    }

    #[tokio::test]
    async fn missing_document_is_reported_not_failed() {
        let tool = RetrievalTool::new(library_with(Arc::new(LengthEmbedder::default())), 4);

        let output = tool
            .invoke(json!({ "query": "anything", "thread_id": "other-thread" }))
            .await
            .unwrap();

        assert_eq!(output["error"], NO_DOCUMENT_MESSAGE);
        assert_eq!(output["query"], "anything");
        assert!(output.get("context").is_none());
    }

    #[tokio::test]
    async fn retrieval_failure_is_a_tool_error() {
        let tool = RetrievalTool::new(library_with(Arc::new(FailingEmbedder)), 4);

        let result = tool
            .invoke(json!({ "query": "anything", "thread_id": "thread-1" }))
            .await;

        assert!(matches!(result, Err(ToolError::Failed { .. })));
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected() {
        let tool = RetrievalTool::new(library_with(Arc::new(LengthEmbedder::default())), 4);
        let result = tool.invoke(json!({ "query": "no thread" })).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(RetrievalTool::new(
            library_with(Arc::new(LengthEmbedder::default())),
            2,
        )));

        assert_eq!(registry.names(), vec![RETRIEVAL_TOOL_NAME]);
        assert_eq!(registry.describe()[0].0, RETRIEVAL_TOOL_NAME);

        let output = registry
            .invoke(RETRIEVAL_TOOL_NAME, json!({ "query": "abc", "thread_id": "thread-1" }))
            .await
            .unwrap();
        assert_eq!(output["context"][0], "abc");

        let unknown = registry.invoke("calculator", json!({})).await;
        assert!(matches!(unknown, Err(ToolError::UnknownTool(name)) if name == "calculator"));
    }
}
