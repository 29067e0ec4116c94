use crate::error::ServiceError;
use crate::traits::Embedder;
use async_trait::async_trait;

pub const DEFAULT_OFFLINE_DIMENSIONS: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Hashes lowercase character trigrams into a fixed number of buckets and
/// L2-normalises the counts. Needs no network; only used when selected
/// explicitly.
#[derive(Debug, Clone, Copy)]
pub struct TrigramHashEmbedder {
    pub dimensions: usize,
}

impl Default for TrigramHashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_OFFLINE_DIMENSIONS,
        }
    }
}

impl TrigramHashEmbedder {
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = FNV_OFFSET;
            let mut buffer = [0u8; 4];
            for ch in window {
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(FNV_PRIME);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for TrigramHashEmbedder {
    fn id(&self) -> String {
        format!("trigram-hash:{}", self.dimensions.max(1))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(self.vectorize(text))
    }
}

/// Checks that a batch response pairs one vector with every input and that
/// all vectors share a dimension.
pub fn check_batch(service: &str, inputs: usize, vectors: &[Vec<f32>]) -> Result<(), ServiceError> {
    if vectors.len() != inputs {
        return Err(ServiceError::MalformedResponse {
            service: service.to_string(),
            details: format!("{} embeddings returned for {} inputs", vectors.len(), inputs),
        });
    }

    if let Some(first) = vectors.first() {
        if let Some(odd) = vectors.iter().find(|vector| vector.len() != first.len()) {
            return Err(ServiceError::MalformedResponse {
                service: service.to_string(),
                details: format!("mixed embedding dimensions {} and {}", first.len(), odd.len()),
            });
        }
    }

    Ok(())
}
