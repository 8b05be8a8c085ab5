//! Retriever - 사용자/공용 인덱스에서 질의 관련 청크 검색
//!
//! 단일 소스는 상위 6개, 두 소스를 함께 쓸 때는 소스별 상위 3개를
//! 사용자 문서부터 번갈아 합쳐 최대 6개를 반환합니다.

use std::fmt;
use std::sync::Arc;

use super::index::{ScoredChunk, VectorIndex};
use super::DocumentChunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};

/// 단일 소스 검색 개수
pub const SINGLE_SOURCE_K: usize = 6;

/// 결합 모드의 소스별 검색 개수
pub const PER_SOURCE_K: usize = 3;

/// 결합 모드 최대 결과 수
pub const MAX_COMBINED: usize = 6;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과의 출처 인덱스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalSource {
    /// 사용자 업로드 문서
    UserDocs,
    /// 공용 지식 베이스
    PreloadedDocs,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::UserDocs => "user_docs",
            RetrievalSource::PreloadedDocs => "preloaded_docs",
        }
    }
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 출처가 표시된 검색 청크
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub origin: RetrievalSource,
    pub distance: f32,
}

impl RetrievedChunk {
    fn from_scored(scored: ScoredChunk, origin: RetrievalSource) -> Self {
        Self {
            chunk: scored.chunk,
            origin,
            distance: scored.distance,
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 인덱스 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    user: Option<Arc<VectorIndex>>,
    global: Option<Arc<VectorIndex>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        user: Option<Arc<VectorIndex>>,
        global: Option<Arc<VectorIndex>>,
    ) -> Self {
        Self {
            embedder,
            user,
            global,
        }
    }

    /// 검색 가능한 인덱스가 하나라도 있는지
    pub fn has_sources(&self) -> bool {
        self.user.is_some() || self.global.is_some()
    }

    /// 질의 관련 청크 검색
    ///
    /// 결합 모드에서 한쪽 소스가 실패하면 경고만 남기고 그 소스는 결과 0개로 취급합니다.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        if !self.has_sources() {
            return Ok(vec![]);
        }

        let query_vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| DocQaError::EmbeddingServiceError(format!("{:#}", e)))?;

        let embedder = self.embedder.as_ref();
        let results = match (&self.user, &self.global) {
            (Some(user), Some(global)) => {
                let user_hits = search_or_skip(
                    embedder,
                    user,
                    &query_vector,
                    PER_SOURCE_K,
                    RetrievalSource::UserDocs,
                );
                let global_hits = search_or_skip(
                    embedder,
                    global,
                    &query_vector,
                    PER_SOURCE_K,
                    RetrievalSource::PreloadedDocs,
                );
                interleave(user_hits, global_hits, MAX_COMBINED)
            }
            (Some(user), None) => search(
                embedder,
                user,
                &query_vector,
                SINGLE_SOURCE_K,
                RetrievalSource::UserDocs,
            )?,
            (None, Some(global)) => search(
                embedder,
                global,
                &query_vector,
                SINGLE_SOURCE_K,
                RetrievalSource::PreloadedDocs,
            )?,
            (None, None) => vec![],
        };

        tracing::debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }
}

fn search(
    embedder: &dyn EmbeddingProvider,
    index: &VectorIndex,
    query: &[f32],
    k: usize,
    origin: RetrievalSource,
) -> Result<Vec<RetrievedChunk>> {
    index.ensure_embedder(embedder.name(), embedder.dimension())?;
    Ok(index
        .search(query, k)?
        .into_iter()
        .map(|scored| RetrievedChunk::from_scored(scored, origin))
        .collect())
}

fn search_or_skip(
    embedder: &dyn EmbeddingProvider,
    index: &VectorIndex,
    query: &[f32],
    k: usize,
    origin: RetrievalSource,
) -> Vec<RetrievedChunk> {
    match search(embedder, index, query, k, origin) {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(
                "Retrieval from {} failed ({}): {}. Continuing without it.",
                origin,
                e.kind(),
                e
            );
            vec![]
        }
    }
}

/// 두 결과 목록을 사용자 문서부터 번갈아 합치고 `max`개로 자름
pub fn interleave(
    user: Vec<RetrievedChunk>,
    global: Vec<RetrievedChunk>,
    max: usize,
) -> Vec<RetrievedChunk> {
    let mut merged = Vec::with_capacity(user.len() + global.len());
    let mut user = user.into_iter();
    let mut global = global.into_iter();

    loop {
        let u = user.next();
        let g = global.next();
        if u.is_none() && g.is_none() {
            break;
        }
        merged.extend(u);
        merged.extend(g);
    }

    merged.truncate(max);
    merged
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::{IndexBuilder, SourceCategory};
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn chunk(text: &str, category: SourceCategory) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source: "doc".to_string(),
            category,
            metadata: BTreeMap::new(),
        }
    }

    fn hit(text: &str, origin: RetrievalSource) -> RetrievedChunk {
        RetrievedChunk {
            chunk: chunk(text, SourceCategory::User),
            origin,
            distance: 0.0,
        }
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashEmbedding::new(768))
    }

    async fn build(dir: &Path, texts: &[&str], category: SourceCategory) -> Arc<VectorIndex> {
        let chunks = texts.iter().map(|t| chunk(t, category)).collect();
        IndexBuilder::new(embedder()).build(chunks, dir).await.unwrap();
        Arc::new(VectorIndex::load(dir).unwrap())
    }

    #[test]
    fn test_interleave_order_and_cap() {
        let user = vec![
            hit("u0", RetrievalSource::UserDocs),
            hit("u1", RetrievalSource::UserDocs),
            hit("u2", RetrievalSource::UserDocs),
        ];
        let global = vec![
            hit("g0", RetrievalSource::PreloadedDocs),
            hit("g1", RetrievalSource::PreloadedDocs),
            hit("g2", RetrievalSource::PreloadedDocs),
        ];
        let merged = interleave(user, global, 4);
        let texts: Vec<&str> = merged.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["u0", "g0", "u1", "g1"]);
    }

    #[test]
    fn test_interleave_uneven() {
        let merged = interleave(
            vec![hit("u0", RetrievalSource::UserDocs)],
            vec![
                hit("g0", RetrievalSource::PreloadedDocs),
                hit("g1", RetrievalSource::PreloadedDocs),
            ],
            6,
        );
        let texts: Vec<&str> = merged.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["u0", "g0", "g1"]);
    }

    #[tokio::test]
    async fn test_no_sources_returns_empty() {
        let retriever = Retriever::new(embedder(), None, None);
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_source_uses_six() {
        let dir = TempDir::new().unwrap();
        let texts: Vec<String> = (0..10).map(|i| format!("fact number {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let user = build(&dir.path().join("user"), &refs, SourceCategory::User).await;

        let results = Retriever::new(embedder(), Some(user), None)
            .retrieve("fact")
            .await
            .unwrap();
        assert_eq!(results.len(), SINGLE_SOURCE_K);
        assert!(results.iter().all(|r| r.origin == RetrievalSource::UserDocs));
    }

    #[tokio::test]
    async fn test_combined_tags_origins() {
        let dir = TempDir::new().unwrap();
        let user_texts = ["user a", "user b", "user c", "user d"];
        let global_texts = ["global a", "global b", "global c", "global d"];
        let user = build(&dir.path().join("user"), &user_texts, SourceCategory::User).await;
        let global = build(&dir.path().join("global"), &global_texts, SourceCategory::Global).await;

        let results = Retriever::new(embedder(), Some(user), Some(global))
            .retrieve("a")
            .await
            .unwrap();
        assert_eq!(results.len(), MAX_COMBINED);
        assert_eq!(results[0].origin, RetrievalSource::UserDocs);
        assert_eq!(results[1].origin, RetrievalSource::PreloadedDocs);
        let user_count = results.iter().filter(|r| r.origin == RetrievalSource::UserDocs).count();
        assert_eq!(user_count, PER_SOURCE_K);
    }

    /// 같은 차원이지만 다른 벡터 공간의 임베더
    struct OtherEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for OtherEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0; 768])
        }

        fn dimension(&self) -> usize {
            768
        }

        fn name(&self) -> &str {
            "gemini-embedding-001"
        }
    }

    #[tokio::test]
    async fn test_index_from_other_embedder_is_not_searched() {
        let dir = TempDir::new().unwrap();
        let user = build(&dir.path().join("user"), &["user a", "user b"], SourceCategory::User).await;

        let err = Retriever::new(Arc::new(OtherEmbedder), Some(user.clone()), None)
            .retrieve("user")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::IndexCorruptOrIncomplete { .. }));

        let global = build(&dir.path().join("global"), &["global a"], SourceCategory::Global).await;
        let results = Retriever::new(Arc::new(OtherEmbedder), Some(user), Some(global))
            .retrieve("anything")
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        // 다른 차원으로 만든 사용자 인덱스는 검색 시 실패
        let user_dir = dir.path().join("user");
        let chunks = vec![chunk("user text", SourceCategory::User)];
        IndexBuilder::new(Arc::new(HashEmbedding::new(16)))
            .build(chunks, &user_dir)
            .await
            .unwrap();
        let user = Arc::new(VectorIndex::load(&user_dir).unwrap());
        let global = build(
            &dir.path().join("global"),
            &["global a", "global b", "global c", "global d"],
            SourceCategory::Global,
        )
        .await;

        let results = Retriever::new(embedder(), Some(user), Some(global))
            .retrieve("global")
            .await
            .unwrap();
        assert_eq!(results.len(), PER_SOURCE_K);
        assert!(results.iter().all(|r| r.origin == RetrievalSource::PreloadedDocs));
    }
}
