//! Prompt assembly for grounded answers.
//!
//! Pure formatting: retrieved chunk texts go first, in the order given,
//! followed by the user's question. Nothing here talks to a model.

use crate::models::ScoredChunk;

pub const CONTEXT_START: &str = "=== CONTEXT START ===";
pub const CONTEXT_END: &str = "=== CONTEXT END ===";
pub const CHUNK_DELIMITER: &str = "---";
pub const QUESTION_HEADER: &str = "=== QUESTION ===";

pub const GROUNDED_INSTRUCTION: &str = "Answer the question using only the context below, \
which was retrieved from the user's uploaded document. If the context does not contain the \
answer, say that the document does not cover it.";

pub const NO_CONTEXT_NOTICE: &str = "No relevant context was found in the uploaded document \
for this question. Tell the user that no relevant context was found instead of guessing.";

pub fn compose_prompt(query_text: &str, hits: &[ScoredChunk]) -> String {
    let mut prompt = String::new();

    if hits.is_empty() {
        prompt.push_str(NO_CONTEXT_NOTICE);
        prompt.push_str("\n\n");
    } else {
        prompt.push_str(GROUNDED_INSTRUCTION);
        prompt.push_str("\n\n");
        prompt.push_str(CONTEXT_START);
        prompt.push('\n');

        for (position, hit) in hits.iter().enumerate() {
            if position > 0 {
                prompt.push_str(CHUNK_DELIMITER);
                prompt.push('\n');
            }
            prompt.push_str(&format!("[{}] {}\n", position + 1, page_label(hit)));
            prompt.push_str(hit.chunk.text.trim_end());
            prompt.push('\n');
        }

        prompt.push_str(CONTEXT_END);
        prompt.push_str("\n\n");
    }

    prompt.push_str(QUESTION_HEADER);
    prompt.push('\n');
    prompt.push_str(query_text.trim());
    prompt.push('\n');
    prompt
}

fn page_label(hit: &ScoredChunk) -> String {
    if hit.chunk.page_start == hit.chunk.page_end {
        format!("(page {})", hit.chunk.page_start)
    } else {
        format!("(pages {}-{})", hit.chunk.page_start, hit.chunk.page_end)
    }
}
