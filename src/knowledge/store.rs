//! Chunk Store - rusqlite 기반 청크 저장소 (`index.db`)
//!
//! 인덱스 디렉토리의 텍스트 측 아티팩트입니다. 청크 본문, 출처, 분류,
//! 메타데이터를 position 순서로 저장하고 인덱스 메타 정보(차원, 임베더, 생성 시각)를
//! 함께 기록합니다. 벡터는 `index.vec`에 같은 position 순서로 저장됩니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};

use super::{DocumentChunk, SourceCategory};
use crate::error::{DocQaError, Result};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 메타 정보
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    /// 벡터 차원
    pub dimension: usize,
    /// 빌드에 사용한 임베딩 프로바이더 이름
    pub embedder: String,
    /// 빌드 시각
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// ChunkStore
// ============================================================================

/// 청크 저장소
#[derive(Debug)]
pub struct ChunkStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl ChunkStore {
    /// 새 저장소 생성 (빌드 시 스테이징 디렉토리에서만 사용)
    pub fn create(path: &Path, meta: &IndexMeta) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DocQaError::storage("create chunk store", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                position INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                category TEXT NOT NULL,
                metadata TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| DocQaError::storage("initialize chunk store", e))?;

        for (key, value) in [
            ("dimension", meta.dimension.to_string()),
            ("embedder", meta.embedder.clone()),
            ("created_at", meta.created_at.to_rfc3339()),
        ] {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| DocQaError::storage("write index meta", e))?;
        }

        tracing::debug!("Chunk store created at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// 기존 저장소를 읽기 전용으로 열기
    ///
    /// 파일이 없거나 스키마가 맞지 않으면 `IndexCorruptOrIncomplete`
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DocQaError::corrupt(path, "chunk store is missing"));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DocQaError::corrupt(path, e))?;

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('meta', 'chunks')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| DocQaError::corrupt(path, e))?;
        if tables != 2 {
            return Err(DocQaError::corrupt(path, "chunk store schema is incomplete"));
        }

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DocQaError::storage("lock chunk store", e))
    }

    /// 청크 일괄 저장 (position은 슬라이스 순서)
    pub fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DocQaError::storage("begin chunk insert", e))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks (position, text, source, category, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| DocQaError::storage("prepare chunk insert", e))?;

            for (position, chunk) in chunks.iter().enumerate() {
                let metadata = serde_json::to_string(&chunk.metadata)
                    .map_err(|e| DocQaError::storage("encode chunk metadata", e))?;
                stmt.execute(params![
                    position as i64,
                    chunk.text,
                    chunk.source,
                    chunk.category.as_str(),
                    metadata
                ])
                .map_err(|e| DocQaError::storage("insert chunk", e))?;
            }
        }

        tx.commit()
            .map_err(|e| DocQaError::storage("commit chunk insert", e))?;

        tracing::debug!("Stored {} chunks in {:?}", chunks.len(), self.db_path);
        Ok(chunks.len())
    }

    /// 메타 정보 조회
    pub fn meta(&self) -> Result<IndexMeta> {
        let conn = self.lock()?;
        let path = &self.db_path;

        let mut stmt = conn
            .prepare("SELECT key, value FROM meta")
            .map_err(|e| DocQaError::corrupt(path, e))?;
        let entries: BTreeMap<String, String> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| DocQaError::corrupt(path, e))?
            .collect::<rusqlite::Result<BTreeMap<String, String>>>()
            .map_err(|e| DocQaError::corrupt(path, e))?;

        let field = |key: &str| {
            entries
                .get(key)
                .cloned()
                .ok_or_else(|| DocQaError::corrupt(path, format!("missing meta key '{}'", key)))
        };

        let dimension = field("dimension")?
            .parse::<usize>()
            .map_err(|e| DocQaError::corrupt(path, format!("invalid dimension: {}", e)))?;
        let created_at = DateTime::parse_from_rfc3339(&field("created_at")?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DocQaError::corrupt(path, format!("invalid created_at: {}", e)))?;

        Ok(IndexMeta {
            dimension,
            embedder: field("embedder")?,
            created_at,
        })
    }

    /// 청크 개수
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| DocQaError::corrupt(&self.db_path, e))?;
        Ok(count as usize)
    }

    /// 전체 청크를 position 순서로 로드
    pub fn load_chunks(&self) -> Result<Vec<DocumentChunk>> {
        let conn = self.lock()?;
        let path = &self.db_path;

        let mut stmt = conn
            .prepare("SELECT text, source, category, metadata FROM chunks ORDER BY position")
            .map_err(|e| DocQaError::corrupt(path, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| DocQaError::corrupt(path, e))?;

        let mut chunks = Vec::new();
        for row in rows {
            let (text, source, category, metadata) = row.map_err(|e| DocQaError::corrupt(path, e))?;
            let category = SourceCategory::parse(&category)
                .ok_or_else(|| DocQaError::corrupt(path, format!("unknown category '{}'", category)))?;
            let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)
                .map_err(|e| DocQaError::corrupt(path, format!("invalid chunk metadata: {}", e)))?;

            chunks.push(DocumentChunk {
                text,
                source,
                category,
                metadata,
            });
        }

        Ok(chunks)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_meta() -> IndexMeta {
        IndexMeta {
            dimension: 4,
            embedder: "hash-embedding".to_string(),
            created_at: Utc::now(),
        }
    }

    fn sample_chunk(text: &str, page: usize) -> DocumentChunk {
        let mut metadata = BTreeMap::new();
        metadata.insert("page".to_string(), page.to_string());
        DocumentChunk {
            text: text.to_string(),
            source: "report.pdf".to_string(),
            category: SourceCategory::User,
            metadata,
        }
    }

    #[test]
    fn test_insert_and_load_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");

        let store = ChunkStore::create(&path, &sample_meta()).unwrap();
        store
            .insert_chunks(&[sample_chunk("first", 1), sample_chunk("second", 2)])
            .unwrap();
        drop(store);

        let store = ChunkStore::open_read_only(&path).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        let chunks = store.load_chunks().unwrap();
        assert_eq!(chunks[0].text, "first");
        assert_eq!(chunks[1].metadata.get("page").map(String::as_str), Some("2"));
        assert_eq!(chunks[1].category, SourceCategory::User);
    }

    #[test]
    fn test_meta_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        let meta = sample_meta();

        drop(ChunkStore::create(&path, &meta).unwrap());

        let loaded = ChunkStore::open_read_only(&path).unwrap().meta().unwrap();
        assert_eq!(loaded.dimension, 4);
        assert_eq!(loaded.embedder, "hash-embedding");
        assert_eq!(loaded.created_at.timestamp(), meta.created_at.timestamp());
    }

    #[test]
    fn test_missing_store_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let err = ChunkStore::open_read_only(&dir.path().join("index.db")).unwrap_err();
        assert!(matches!(err, DocQaError::IndexCorruptOrIncomplete { .. }));
    }

    #[test]
    fn test_foreign_database_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        Connection::open(&path)
            .unwrap()
            .execute("CREATE TABLE other (id INTEGER)", [])
            .unwrap();

        let err = ChunkStore::open_read_only(&path).unwrap_err();
        assert!(matches!(err, DocQaError::IndexCorruptOrIncomplete { .. }));
    }
}
