//! Vector File - 임베딩 벡터 영속화 및 유사도 유틸리티
//!
//! `index.vec` 파일은 bincode로 직렬화된 [`VectorFile`]입니다.
//! 벡터 순서는 `index.db`의 청크 position과 1:1로 대응합니다.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};

/// 파일 식별자
const VECTOR_MAGIC: [u8; 4] = *b"DQVF";

/// 포맷 버전
const VECTOR_FORMAT_VERSION: u32 = 1;

// ============================================================================
// VectorFile
// ============================================================================

/// 직렬화되는 벡터 집합
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorFile {
    magic: [u8; 4],
    version: u32,
    /// 벡터 차원
    pub dimension: usize,
    /// 청크 position 순서의 벡터
    pub vectors: Vec<Vec<f32>>,
}

impl VectorFile {
    /// 새 벡터 파일 생성, 모든 벡터가 같은 차원이어야 함
    pub fn new(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(DocQaError::EmbeddingServiceError(format!(
                "vector {} has dimension {}, expected {}",
                i,
                v.len(),
                dimension
            )));
        }

        Ok(Self {
            magic: VECTOR_MAGIC,
            version: VECTOR_FORMAT_VERSION,
            dimension,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// 파일로 저장
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| DocQaError::storage("create vector file", e))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| DocQaError::storage("write vector file", e))?;
        Ok(())
    }

    /// 파일에서 읽기, 형식이 맞지 않으면 `IndexCorruptOrIncomplete`
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| DocQaError::corrupt(path, e))?;
        let parsed: VectorFile = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| DocQaError::corrupt(path, format!("unreadable vector file: {}", e)))?;

        if parsed.magic != VECTOR_MAGIC {
            return Err(DocQaError::corrupt(path, "not a vector file"));
        }
        if parsed.version != VECTOR_FORMAT_VERSION {
            return Err(DocQaError::corrupt(
                path,
                format!("unsupported vector format version {}", parsed.version),
            ));
        }
        if parsed.vectors.iter().any(|v| v.len() != parsed.dimension) {
            return Err(DocQaError::corrupt(path, "inconsistent vector dimensions"));
        }

        Ok(parsed)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 코사인 거리 (0.0 = 동일 방향)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
        assert!(cosine_distance(&a, &a).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_distance(&a, &d) - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_vector_file_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");

        let file = VectorFile::new(vec![vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        file.write(&path).unwrap();

        let loaded = VectorFile::read(&path).unwrap();
        assert_eq!(loaded.dimension, 2);
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        assert!(VectorFile::new(vec![vec![0.1, 0.2], vec![0.3]]).is_err());
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");
        std::fs::write(&path, b"garbage").unwrap();

        let err = VectorFile::read(&path).unwrap_err();
        assert!(matches!(err, DocQaError::IndexCorruptOrIncomplete { .. }));
    }
}
