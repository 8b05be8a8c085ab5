//! Knowledge 모듈 - 청킹, 벡터 인덱스, 검색
//!
//! - Chunker: 재귀 문자 분할 (1500자, 오버랩 300자)
//! - Index: `index.vec` (bincode 벡터) + `index.db` (SQLite 청크 저장소)
//! - Retriever: 사용자/공용 인덱스 검색과 결과 병합

mod chunker;
mod index;
mod retriever;
mod store;
mod vector;

use std::collections::BTreeMap;
use std::fmt;

// Re-exports
pub use chunker::{default_chunker, ChunkConfig, Chunker, RecursiveChunker, DEFAULT_SEPARATORS};
pub use index::{
    inspect, remove_index, BuildSummary, IndexBuilder, IndexStatus, ScoredChunk, VectorIndex,
    CHUNK_FILE, VECTOR_FILE,
};
pub use retriever::{
    interleave, RetrievalSource, RetrievedChunk, Retriever, MAX_COMBINED, PER_SOURCE_K,
    SINGLE_SOURCE_K,
};
pub use store::{ChunkStore, IndexMeta};
pub use vector::{cosine_distance, cosine_similarity, VectorFile};

// ============================================================================
// Types
// ============================================================================

/// 청크 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCategory {
    /// 사용자 업로드 문서
    User,
    /// 공용 지식 베이스 (preloaded)
    Global,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::User => "user",
            SourceCategory::Global => "preloaded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(SourceCategory::User),
            "preloaded" => Some(SourceCategory::Global),
            _ => None,
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 인덱싱 단위 청크
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// 청크 본문
    pub text: String,
    /// 출처 (파일 이름 또는 URL)
    pub source: String,
    /// 분류
    pub category: SourceCategory,
    /// 위치 메타데이터 (page, row 등)
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in [SourceCategory::User, SourceCategory::Global] {
            assert_eq!(SourceCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(SourceCategory::parse("other"), None);
    }
}
