/// Embedding seam for similarity-mode sources
///
/// - EmbeddingProvider trait for abstraction over the external vector service
/// - HashingEmbedder for offline, deterministic vectors (default)
/// - FastEmbedProvider for local model inference (`fastembed` feature)
mod provider;

#[cfg(feature = "fastembed")]
pub use provider::FastEmbedProvider;
pub use provider::{cosine_similarity, EmbeddingError, EmbeddingProvider, HashingEmbedder};

use crate::config::EmbeddingConfig;
use crate::error::{FerretError, Result};
use std::sync::Arc;

/// Build the provider selected in configuration
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension)?)),
        #[cfg(feature = "fastembed")]
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        #[cfg(not(feature = "fastembed"))]
        "fastembed" => Err(FerretError::Config(
            "embedding.provider 'fastembed' requires building with the `fastembed` feature"
                .to_string(),
        )),
        other => Err(FerretError::InvalidConfigValue {
            path: "embedding.provider".to_string(),
            message: format!("Unknown provider '{}'", other),
        }),
    }
}

/// Embed `text` on the blocking pool
///
/// The returned future only waits on the pool; dropping it (step timeout,
/// deadline, cancellation) abandons the wait while inference finishes in the
/// background and its vector is discarded.
pub async fn embed_query(embedder: &Arc<dyn EmbeddingProvider>, text: &str) -> Result<Vec<f32>> {
    let embedder = Arc::clone(embedder);
    let text = text.to_string();
    let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
        .await
        .map_err(|e| FerretError::Embedding(format!("embedding task failed: {}", e)))??;
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider_is_hashing() {
        let config = EmbeddingConfig::default();
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.dimension(), config.dimension);
        assert!(provider.model_name().starts_with("hashing"));
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(provider_from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_embed_query_matches_direct_call() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(32).unwrap());
        let direct = provider.embed("beacon to 10.0.0.5").unwrap();
        let pooled = embed_query(&provider, "beacon to 10.0.0.5").await.unwrap();
        assert_eq!(direct, pooled);
        assert!(embed_query(&provider, "  ").await.is_err());
    }
}
