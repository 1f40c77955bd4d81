//! 임베딩 모듈 - 엔티티 문서와 질의를 벡터로 변환
//!
//! - `HashedEmbedding`: 오프라인 특징 해싱 (기본값, API 키 불필요)
//! - `GeminiEmbedding`: Gemini embedContent API
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(EmbedderKind::Hashed, 768)?;
//! let vector = embedder.embed_query("database password").await?;
//! ```

mod gemini;
mod hashed;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::GeminiEmbedding;
pub(crate) use gemini::GeminiError;
pub use hashed::HashedEmbedding;

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 문서 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: 문서와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름 (인덱스 manifest에 기록됨)
    fn name(&self) -> &str;
}

// ============================================================================
// Factory
// ============================================================================

/// 임베딩 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedderKind {
    /// 로컬 특징 해싱
    Hashed,
    /// Google Gemini API
    Gemini,
}

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(kind: EmbedderKind, dimension: usize) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match kind {
        EmbedderKind::Hashed => Arc::new(HashedEmbedding::new(dimension)?),
        EmbedderKind::Gemini => {
            if !has_api_key() {
                anyhow::bail!(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                     Set: export GEMINI_API_KEY=your-api-key\n\
                     Or run with --embedder hashed for offline search."
                );
            }
            Arc::new(GeminiEmbedding::from_env_with_dimension(dimension)?)
        }
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// API Key Management
// ============================================================================

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// API 키 로드 (GEMINI_API_KEY > GOOGLE_AI_API_KEY)
pub fn get_api_key() -> Result<String> {
    for var in API_KEY_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부
pub fn has_api_key() -> bool {
    API_KEY_VARS
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_hashed_embedder() {
        let embedder = create_embedder(EmbedderKind::Hashed, 256).unwrap();
        assert_eq!(embedder.dimension(), 256);
        assert_eq!(embedder.name(), "hashed-sha256");
    }

    #[tokio::test]
    async fn test_default_embed_query_matches_embed() {
        let embedder = create_embedder(EmbedderKind::Hashed, 128).unwrap();
        let a = embedder.embed("ssh key").await.unwrap();
        let b = embedder.embed_query("ssh key").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let embedder = create_embedder(EmbedderKind::Hashed, 128).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }
}
