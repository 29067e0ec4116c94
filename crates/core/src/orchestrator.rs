use crate::compose::compose_prompt;
use crate::error::RagError;
use crate::library::DocumentLibrary;
use crate::models::QueryResult;
use crate::session::ChatSession;
use crate::traits::ChatModel;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub prompt: String,
    pub context: QueryResult,
}

/// Answers questions inside a chat session: retrieve, compose, generate.
pub struct ChatCoordinator {
    library: Arc<DocumentLibrary>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl ChatCoordinator {
    pub fn new(library: Arc<DocumentLibrary>, model: Arc<dyn ChatModel>, top_k: usize) -> Self {
        Self {
            library,
            model,
            top_k,
        }
    }

    pub fn library(&self) -> &Arc<DocumentLibrary> {
        &self.library
    }

    /// Builds the grounded prompt for `question` without calling the model.
    pub async fn prepare(&self, thread_id: &str, question: &str) -> Result<(String, QueryResult), RagError> {
        if question.trim().is_empty() {
            return Err(RagError::Config("question is empty".to_string()));
        }

        let context = self.library.retrieve(thread_id, question, self.top_k).await?;
        Ok((compose_prompt(question, &context), context))
    }

    /// Retrieval or generation failures leave the session untouched.
    pub async fn answer(&self, session: &mut ChatSession, question: &str) -> Result<Answer, RagError> {
        let (prompt, context) = self.prepare(&session.thread_id, question).await?;
        let text = self.model.generate(&prompt).await?;

        session.push_user(question);
        session.push_assistant(text.clone());

        info!(
            thread_id = %session.thread_id,
            context_chunks = context.len(),
            answer_chars = text.chars().count(),
            "question answered"
        );

        Ok(Answer {
            text,
            prompt,
            context,
        })
    }
}
