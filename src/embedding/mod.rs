//! 임베딩 모듈 - 청크/질의 텍스트 벡터화
//!
//! - [`GeminiEmbedding`]: Gemini API (gemini-embedding-001)
//! - [`HashEmbedding`]: API 없이 동작하는 결정적 해시 임베딩 (오프라인/테스트용)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&Config::from_env())?;
//! let vector = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hash;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, EmbedderKind};

pub use gemini::GeminiEmbedding;
pub(crate) use gemini::{backoff_for as gemini_backoff, GeminiError, RateLimiter};
pub use hash::HashEmbedding;

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 문서 청크와 검색 질의를 같은 벡터 공간으로 변환합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: 문서 임베딩과 동일)
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
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

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
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

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedder {
        EmbedderKind::Gemini => {
            let api_key = get_api_key()?;
            let embedder = GeminiEmbedding::with_dimension(api_key, config.embedding_dimension)?;
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Hash => {
            tracing::info!(
                "Using local hash embedding (dimension: {})",
                config.embedding_dimension
            );
            Ok(Arc::new(HashEmbedding::new(config.embedding_dimension)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_factory_needs_no_key() {
        let config = Config::default().with_embedder(EmbedderKind::Hash);
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), DEFAULT_DIMENSION);
        assert_eq!(embedder.name(), "hash-embedding");
    }

    #[tokio::test]
    async fn test_default_embed_batch_preserves_order() {
        let embedder = HashEmbedding::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }
}
