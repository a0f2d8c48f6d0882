//! # Embedding Module
//!
//! Local text embeddings behind the [`EmbeddingModel`] capability.
//!
//! The bundled [`HashingEmbedder`] uses signed feature hashing over word
//! unigrams and bigrams, L2-normalized. It is deterministic, needs no model
//! files and serves every model id listed in `EMBEDDING_MODELS`.

use crate::{
    error::ServiceError,
    schemas::{EmbeddingRequest, EmbeddingResponse},
};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model '{0}' is not available")]
    UnknownModel(String),
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

impl From<EmbeddingError> for ServiceError {
    fn from(err: EmbeddingError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

/// Embedding capability.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Vector length of every embedding this model returns
    fn dimension(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed(&self, model: &str, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    models: HashSet<String>,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new<I, S>(models: I, dimension: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            dimension: dimension.max(1),
        }
    }

    pub fn supports(&self, model: &str) -> bool {
        self.models.contains(model)
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0.0f32; dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            add_feature(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            add_feature(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn add_feature(vector: &mut [f32], feature: &[u8], weight: f32) {
    let hash = fnv1a(feature);
    let slot = (hash % vector.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[slot] += sign * weight;
}

/// FNV-1a, stable across builds and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingModel for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, model: &str, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.supports(model) {
            return Err(EmbeddingError::UnknownModel(model.to_string()));
        }

        let dimension = self.dimension;
        tokio::task::spawn_blocking(move || {
            inputs
                .iter()
                .map(|text| HashingEmbedder::encode(text, dimension))
                .collect()
        })
        .await
        .map_err(|e| EmbeddingError::Backend(e.to_string()))
    }
}

/// Validate an embedding request and run it.
///
/// Empty model or input fails with [`ServiceError::NotFound`]; backend failures
/// with [`ServiceError::Internal`].
pub async fn embed_request(
    embedder: &dyn EmbeddingModel,
    request: EmbeddingRequest,
) -> Result<EmbeddingResponse, ServiceError> {
    if request.model.trim().is_empty() {
        return Err(ServiceError::NotFound("Model name must be provided".to_string()));
    }
    let input = match request.input {
        Some(input) if !input.is_empty() => input,
        _ => return Err(ServiceError::NotFound("Input text must be provided".to_string())),
    };

    let texts = input.into_texts();
    debug!(model = %request.model, inputs = texts.len(), backend = embedder.name(), "Embedding request");

    let vectors = embedder.embed(&request.model, texts).await.map_err(|err| {
        error!(model = %request.model, error = %err, "Embedding failed");
        ServiceError::from(err)
    })?;

    Ok(EmbeddingResponse::from_vectors(request.model, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::EmbeddingInput;

    fn embedder() -> HashingEmbedder {
        HashingEmbedder::new(["all-MiniLM-L6-v2"], 384)
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_vectors_are_normalized_and_deterministic() {
        let vectors = embedder()
            .embed("all-MiniLM-L6-v2", vec!["Hello world".into(), "Hello world".into()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_similar_texts_score_higher() {
        let vectors = embedder()
            .embed(
                "all-MiniLM-L6-v2",
                vec![
                    "the cat sat on the mat".into(),
                    "a cat sat on a mat".into(),
                    "quarterly revenue grew in europe".into(),
                ],
            )
            .await
            .unwrap();

        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn test_unknown_model_fails() {
        let err = embedder().embed("bert", vec!["x".into()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn test_embed_request_validation() {
        let embedder = embedder();

        let err = embed_request(&embedder, EmbeddingRequest::default()).await.unwrap_err();
        assert_eq!(err.detail(), "Model name must be provided");

        let missing_input = EmbeddingRequest {
            model: "all-MiniLM-L6-v2".into(),
            input: Some(EmbeddingInput::Batch(vec![])),
        };
        let err = embed_request(&embedder, missing_input).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let unknown = EmbeddingRequest {
            model: "bert".into(),
            input: Some(EmbeddingInput::Single("hi".into())),
        };
        assert!(matches!(
            embed_request(&embedder, unknown).await,
            Err(ServiceError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_embed_request_response_shape() {
        let request = EmbeddingRequest {
            model: "all-MiniLM-L6-v2".into(),
            input: Some(EmbeddingInput::Batch(vec!["a".into(), "b".into(), "c".into()])),
        };
        let response = embed_request(&embedder(), request).await.unwrap();

        assert_eq!(response.object, "list");
        assert_eq!(response.model, "all-MiniLM-L6-v2");
        assert_eq!(response.data.len(), 3);
        assert_eq!(response.data[2].index, 2);
        assert_eq!(response.data[0].object, "embedding");
    }
}
