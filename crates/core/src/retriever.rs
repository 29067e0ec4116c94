use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::QueryResult;
use crate::traits::Embedder;
use std::sync::Arc;
use tracing::debug;

/// Embeds a query and looks it up in one index snapshot.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Option<Arc<VectorIndex>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index: Some(index),
        }
    }

    /// A retriever with nothing to search; every query yields no context.
    pub fn uninitialized(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            index: None,
        }
    }

    pub fn has_index(&self) -> bool {
        self.index.as_ref().is_some_and(|index| !index.is_empty())
    }

    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<QueryResult, RagError> {
        if k == 0 {
            return Err(RagError::Config("k must be at least 1".to_string()));
        }

        let index = match &self.index {
            Some(index) if !index.is_empty() => index,
            _ => return Ok(Vec::new()),
        };

        let embedder_id = self.embedder.id();
        if index.embedder_id() != embedder_id {
            return Err(RagError::Config(format!(
                "index was built with embedder {} but queries use {embedder_id}",
                index.embedder_id()
            )));
        }

        let query_vector = self.embedder.embed(query_text).await?;
        let result = index.query(&query_vector, k)?;

        debug!(
            k,
            hits = result.len(),
            closest = result.first().map(|hit| hit.distance),
            "retrieved chunks"
        );
        Ok(result)
    }
}
