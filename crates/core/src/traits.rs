use crate::error::ServiceError;
use async_trait::async_trait;

/// Hosted (or local) text embedding capability.
///
/// Every vector returned by one embedder has the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identity of the vector space: provider, model and dimension.
    /// Indexes remember it and refuse queries from a different embedder.
    fn id(&self) -> String;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Hosted LLM that turns a prompt into an answer.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
