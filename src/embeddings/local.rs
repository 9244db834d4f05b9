// src/embeddings/local.rs
// Local deterministic embeddings (feature hashing, no network)

use sha2::{Digest, Sha256};

use crate::error::ProviderError;

/// Local embedding backend: hashed bag-of-words over lowercase alphanumeric
/// tokens, L2-normalized. Texts sharing vocabulary land close in cosine
/// space, which is enough for offline deployments and tests. Deterministic:
/// the same text always produces the same vector.
pub struct LocalEmbeddings {
    model: String,
    dimensions: usize,
}

impl LocalEmbeddings {
    pub fn new(model: String, dimensions: usize) -> Self {
        Self { model, dimensions }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn generate(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }

    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let bucket = token_bucket(&token, self.dimensions);
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn token_bucket(token: &str, dimensions: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(bytes) % dimensions as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn deterministic_for_same_text() {
        let local = LocalEmbeddings::new("local-test".into(), 256);
        let a = local.generate("authentication bug fix").await.unwrap();
        let b = local.generate("authentication bug fix").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let local = LocalEmbeddings::new("local-test".into(), 256);
        let auth = local.generate("authentication bug in login").await.unwrap();
        let similar = local.generate("login authentication bug").await.unwrap();
        let unrelated = local.generate("weather forecast sunny tomorrow").await.unwrap();

        assert!(cosine(&auth, &similar) > cosine(&auth, &unrelated));
        assert!(cosine(&auth, &similar) > 0.9);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let local = LocalEmbeddings::new("local-test".into(), 128);
        let v = local.generate("hello world").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
