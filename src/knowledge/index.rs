//! Vector Index - 청크 임베딩 인덱스 빌드/로드/검색
//!
//! 인덱스 디렉토리는 두 아티팩트로 구성됩니다.
//! - `index.vec`: bincode 벡터 파일
//! - `index.db`: SQLite 청크 저장소
//!
//! 빌드는 형제 스테이징 디렉토리에서 완성한 뒤 rename으로 교체합니다.
//! 실패하면 기존 인덱스는 그대로 남습니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::store::{ChunkStore, IndexMeta};
use super::vector::{cosine_distance, VectorFile};
use super::DocumentChunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};

/// 벡터 아티팩트 파일명
pub const VECTOR_FILE: &str = "index.vec";

/// 청크 저장소 파일명
pub const CHUNK_FILE: &str = "index.db";

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 청크
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// 코사인 거리 (작을수록 유사)
    pub distance: f32,
    /// 인덱스 내 삽입 순서
    pub position: usize,
}

/// 디스크 상의 인덱스 상태
#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    /// 인덱스 디렉토리 없음
    Missing,
    /// 일부 아티팩트만 존재
    Incomplete { found: Vec<String> },
    /// 두 아티팩트 모두 존재
    Ready {
        vector_bytes: u64,
        chunk_bytes: u64,
        created_at: Option<DateTime<Utc>>,
    },
}

impl IndexStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexStatus::Ready { .. })
    }
}

/// 빌드 결과 요약
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub path: PathBuf,
    pub chunk_count: usize,
    pub dimension: usize,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 메모리에 로드된 읽기 전용 인덱스
#[derive(Debug)]
pub struct VectorIndex {
    dir: PathBuf,
    meta: IndexMeta,
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// 인덱스 디렉토리 로드
    ///
    /// 아티팩트가 하나라도 없거나 서로 맞지 않으면 `IndexCorruptOrIncomplete`
    pub fn load(dir: &Path) -> Result<Self> {
        match inspect(dir) {
            IndexStatus::Ready { .. } => {}
            IndexStatus::Missing => {
                return Err(DocQaError::corrupt(dir, "index does not exist"));
            }
            IndexStatus::Incomplete { found } => {
                return Err(DocQaError::corrupt(
                    dir,
                    format!("partial index, found only [{}]", found.join(", ")),
                ));
            }
        }

        let vector_file = VectorFile::read(&dir.join(VECTOR_FILE))?;
        let store = ChunkStore::open_read_only(&dir.join(CHUNK_FILE))?;
        let meta = store.meta()?;
        let chunks = store.load_chunks()?;

        if vector_file.len() != chunks.len() {
            return Err(DocQaError::corrupt(
                dir,
                format!(
                    "{} vectors but {} chunks",
                    vector_file.len(),
                    chunks.len()
                ),
            ));
        }
        if !vector_file.is_empty() && vector_file.dimension != meta.dimension {
            return Err(DocQaError::corrupt(
                dir,
                format!(
                    "vector dimension {} does not match recorded dimension {}",
                    vector_file.dimension, meta.dimension
                ),
            ));
        }

        tracing::debug!("Loaded index {:?} ({} chunks)", dir, chunks.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            meta,
            chunks,
            vectors: vector_file.vectors,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 인덱스를 만든 임베더와 질의 임베더가 같은지 확인
    ///
    /// 이름이나 차원이 다르면 벡터 공간이 달라 검색 결과가 의미 없으므로
    /// `IndexCorruptOrIncomplete`
    pub fn ensure_embedder(&self, name: &str, dimension: usize) -> Result<()> {
        if self.meta.embedder != name {
            return Err(DocQaError::corrupt(
                &self.dir,
                format!("built with {}, queried with {}", self.meta.embedder, name),
            ));
        }
        if self.meta.dimension != dimension {
            return Err(DocQaError::corrupt(
                &self.dir,
                format!(
                    "built with dimension {}, queried with dimension {}",
                    self.meta.dimension, dimension
                ),
            ));
        }
        Ok(())
    }

    /// 질의 벡터와 가장 가까운 k개 청크
    ///
    /// 거리 오름차순, 같은 거리면 삽입 순서
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.meta.dimension {
            return Err(DocQaError::corrupt(
                &self.dir,
                format!(
                    "query dimension {} does not match index dimension {}",
                    query.len(),
                    self.meta.dimension
                ),
            ));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, cosine_distance(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .filter_map(|(position, distance)| {
                self.chunks.get(position).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    distance,
                    position,
                })
            })
            .collect())
    }
}

// ============================================================================
// Inspection / Removal
// ============================================================================

/// 디스크 상태 확인 (아티팩트 존재 여부, 크기, 빌드 시각)
pub fn inspect(dir: &Path) -> IndexStatus {
    if !dir.is_dir() {
        return IndexStatus::Missing;
    }

    let vector = std::fs::metadata(dir.join(VECTOR_FILE)).ok().filter(|m| m.is_file());
    let chunk = std::fs::metadata(dir.join(CHUNK_FILE)).ok().filter(|m| m.is_file());

    match (vector, chunk) {
        (Some(v), Some(c)) => {
            let created_at = ChunkStore::open_read_only(&dir.join(CHUNK_FILE))
                .and_then(|store| store.meta())
                .map(|meta| meta.created_at)
                .ok();
            IndexStatus::Ready {
                vector_bytes: v.len(),
                chunk_bytes: c.len(),
                created_at,
            }
        }
        (v, c) => {
            let mut found = Vec::new();
            if v.is_some() {
                found.push(VECTOR_FILE.to_string());
            }
            if c.is_some() {
                found.push(CHUNK_FILE.to_string());
            }
            IndexStatus::Incomplete { found }
        }
    }
}

/// 인덱스 디렉토리 삭제
///
/// 먼저 숨김 이름으로 rename해 읽는 쪽이 반쯤 지워진 인덱스를 보지 않게 합니다.
pub fn remove_index(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let tombstone = sibling_path(dir, "deleted");
    std::fs::rename(dir, &tombstone).map_err(|e| DocQaError::storage("detach index", e))?;
    std::fs::remove_dir_all(&tombstone).map_err(|e| DocQaError::storage("remove index", e))?;

    tracing::info!("Removed index {:?}", dir);
    Ok(())
}

/// `<parent>/.<name>.<tag>-<uuid>` 형태의 형제 경로
fn sibling_path(target: &Path, tag: &str) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("index");
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{}.{}-{}", name, tag, uuid::Uuid::new_v4()))
}

// ============================================================================
// IndexBuilder
// ============================================================================

/// 인덱스 빌더
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// 청크를 임베딩해 `target`에 인덱스를 새로 만든다 (기존 인덱스는 교체)
    pub async fn build(&self, chunks: Vec<DocumentChunk>, target: &Path) -> Result<BuildSummary> {
        if chunks.is_empty() {
            return Err(DocQaError::EmptyCorpusError(format!(
                "no chunks to index for {}",
                target.display()
            )));
        }

        tracing::info!(
            "Embedding {} chunks with {} for {:?}",
            chunks.len(),
            self.embedder.name(),
            target
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| DocQaError::EmbeddingServiceError(format!("{:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(DocQaError::EmbeddingServiceError(format!(
                "expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let vector_file = VectorFile::new(vectors)?;
        let meta = IndexMeta {
            dimension: vector_file.dimension,
            embedder: self.embedder.name().to_string(),
            created_at: Utc::now(),
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DocQaError::storage("create index parent directory", e))?;
        }

        let staging = sibling_path(target, "staging");
        if let Err(e) = write_artifacts(&staging, &vector_file, &meta, &chunks) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        swap_into_place(&staging, target)?;

        tracing::info!(
            "Index ready at {:?} ({} chunks, dimension {})",
            target,
            chunks.len(),
            meta.dimension
        );

        Ok(BuildSummary {
            path: target.to_path_buf(),
            chunk_count: chunks.len(),
            dimension: meta.dimension,
        })
    }
}

fn write_artifacts(
    staging: &Path,
    vectors: &VectorFile,
    meta: &IndexMeta,
    chunks: &[DocumentChunk],
) -> Result<()> {
    std::fs::create_dir_all(staging)
        .map_err(|e| DocQaError::storage("create staging directory", e))?;

    vectors.write(&staging.join(VECTOR_FILE))?;

    let store = ChunkStore::create(&staging.join(CHUNK_FILE), meta)?;
    store.insert_chunks(chunks)?;
    Ok(())
}

/// 스테이징 디렉토리를 대상 위치로 교체
fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    let previous = if target.exists() {
        let old = sibling_path(target, "old");
        if let Err(e) = std::fs::rename(target, &old) {
            let _ = std::fs::remove_dir_all(staging);
            return Err(DocQaError::storage("move previous index aside", e));
        }
        Some(old)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging, target) {
        if let Some(old) = &previous {
            if let Err(restore) = std::fs::rename(old, target) {
                tracing::error!("Failed to restore previous index {:?}: {}", old, restore);
            }
        }
        let _ = std::fs::remove_dir_all(staging);
        return Err(DocQaError::storage("install new index", e));
    }

    if let Some(old) = previous {
        if let Err(e) = std::fs::remove_dir_all(&old) {
            tracing::warn!("Failed to remove previous index {:?}: {}", old, e);
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
