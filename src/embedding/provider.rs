/// Embedding provider trait, a deterministic hashing embedder, and the optional
/// FastEmbed implementation
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<EmbeddingError> for crate::error::FerretError {
    fn from(e: EmbeddingError) -> Self {
        crate::error::FerretError::Embedding(e.to_string())
    }
}

/// Trait for embedding providers
///
/// The text-to-vector service is an external collaborator; similarity-mode
/// sources only see it through this trait.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Offline embedder using signed feature hashing over word unigrams and bigrams.
///
/// Needs no model download and is fully deterministic, which makes it the
/// default for tests and air-gapped deployments. Vectors are L2-normalized.
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            model_name: format!("hashing-{}", dimension),
        })
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&bytes[..8]);
        let index = (u64::from_le_bytes(idx) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_')
            .map(|t| t.trim_matches(|c: char| c == '.' || c == '-' || c == '_'))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        if tokens.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let (i, s) = self.bucket(token);
            vector[i] += s;
        }
        for pair in tokens.windows(2) {
            let (i, s) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[i] += 0.5 * s;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 model (384 dimensions) by default.
#[cfg(feature = "fastembed")]
pub struct FastEmbedProvider {
    model: std::sync::Arc<fastembed::TextEmbedding>,
    model_name: String,
    dimension: usize,
}

#[cfg(feature = "fastembed")]
impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// Models are downloaded on-demand to `~/.cache/huggingface/` on first use.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!(model = model_name, dimension, "Initializing embedding model");

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: std::sync::Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

#[cfg(feature = "fastembed")]
impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_dimension_and_norm() {
        let provider = HashingEmbedder::new(64).unwrap();
        let v = provider.embed("ransomware encrypted the file server").unwrap();
        assert_eq!(v.len(), 64);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hashing_is_deterministic() {
        let provider = HashingEmbedder::new(128).unwrap();
        let a = provider.embed("Phishing email with macro").unwrap();
        let b = provider.embed("phishing EMAIL with macro").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hashing_similarity_ordering() {
        let provider = HashingEmbedder::new(256).unwrap();
        let q = provider.embed("lateral movement via smb").unwrap();
        let close = provider.embed("possible lateral movement over smb shares").unwrap();
        let far = provider.embed("quarterly compliance report").unwrap();
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_empty_text_rejected() {
        let provider = HashingEmbedder::new(32).unwrap();
        assert!(provider.embed("   ").is_err());
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }
}
