//! Workspace - 사용자 문서 생애주기와 공용 지식 베이스
//!
//! 디렉토리 구조 (데이터 루트 기준):
//! ```text
//! user_data/<user>/<document>     업로드 문서 (사용자당 1개, URL은 .url 포인터)
//! user_data/<user>/index/         사용자 인덱스 (index.vec + index.db)
//! user_data/<user>/chats/         대화 기록
//! preloaded_docs/                 공용 문서 원본
//! global_knowledge_base/          공용 인덱스
//! scraped_data/<tag>/             수집된 업데이트
//! ```
//!
//! 상태 전이: Empty → DocumentPresent(미인덱싱) → DocumentPresent(인덱싱됨)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::embedding::EmbeddingProvider;
use crate::error::{DocQaError, Result};
use crate::knowledge::{
    inspect, remove_index, BuildSummary, Chunker, DocumentChunk, IndexBuilder, IndexStatus,
    RecursiveChunker, SourceCategory,
};
use crate::loader::{file_name_of, resolve, DocumentLoader, LoadedRecord, ResolvedSource, SourceKind};

/// URL 포인터 파일 확장자
const URL_POINTER_EXTENSION: &str = "url";

// ============================================================================
// Types
// ============================================================================

/// 사용자가 업로드한 문서
#[derive(Debug, Clone, PartialEq)]
pub struct UserDocument {
    /// 저장된 파일 이름
    pub name: String,
    /// 저장 경로
    pub path: PathBuf,
    /// URL 업로드인 경우 원본 URL
    pub url: Option<String>,
}

impl UserDocument {
    /// 표시 이름 (URL이면 URL)
    pub fn display_name(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.name)
    }
}

/// 사용자 문서 상태
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    Empty,
    Unindexed(UserDocument),
    Indexed(UserDocument),
}

/// 사용자 상태 보고
#[derive(Debug, Clone)]
pub struct UserStatus {
    pub document: Option<UserDocument>,
    pub index: IndexStatus,
}

impl UserStatus {
    pub fn state(&self) -> DocumentState {
        match (&self.document, self.index.is_ready()) {
            (None, _) => DocumentState::Empty,
            (Some(doc), true) => DocumentState::Indexed(doc.clone()),
            (Some(doc), false) => DocumentState::Unindexed(doc.clone()),
        }
    }
}

/// 공용 지식 베이스 상태 보고
#[derive(Debug, Clone)]
pub struct GlobalStatus {
    /// preloaded_docs 안의 지원 문서 목록 (이름순)
    pub documents: Vec<String>,
    pub index: IndexStatus,
}

/// 저장 전 검증된 입력
enum StagedInput {
    File { name: String, bytes: Vec<u8> },
    Url { url: String, pointer_name: String },
}

// ============================================================================
// Workspace
// ============================================================================

/// 데이터 루트 위의 문서/인덱스 관리자
pub struct Workspace {
    data_dir: PathBuf,
    loader: DocumentLoader,
    chunker: RecursiveChunker,
    builder: IndexBuilder,
}

impl Workspace {
    pub fn new(data_dir: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            loader: DocumentLoader::new()?,
            chunker: RecursiveChunker::with_defaults(),
            builder: IndexBuilder::new(embedder),
        })
    }

    // ------------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------------

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `user_data/`
    pub fn users_root(&self) -> PathBuf {
        self.data_dir.join("user_data")
    }

    pub fn user_dir(&self, user: &str) -> PathBuf {
        self.users_root().join(user)
    }

    pub fn user_index_dir(&self, user: &str) -> PathBuf {
        self.user_dir(user).join("index")
    }

    pub fn preloaded_dir(&self) -> PathBuf {
        self.data_dir.join("preloaded_docs")
    }

    pub fn global_index_dir(&self) -> PathBuf {
        self.data_dir.join("global_knowledge_base")
    }

    pub fn scraped_dir(&self) -> PathBuf {
        self.data_dir.join("scraped_data")
    }

    // ------------------------------------------------------------------------
    // User document lifecycle
    // ------------------------------------------------------------------------

    /// 현재 업로드된 문서 (없으면 None)
    pub fn user_document(&self, user: &str) -> Result<Option<UserDocument>> {
        let dir = self.user_dir(user);
        let Some(path) = list_documents(&dir, true).into_iter().next() else {
            return Ok(None);
        };

        let name = file_name_of(&path.to_string_lossy());
        let url = if is_url_pointer(&path) {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| DocQaError::storage("read URL pointer", e))?;
            Some(content.trim().to_string())
        } else {
            None
        };

        Ok(Some(UserDocument { name, path, url }))
    }

    /// 문서 업로드 후 인덱싱
    ///
    /// 이미 문서가 있으면 `DocumentAlreadyPresent`. 인덱싱이 실패하면 문서는
    /// 미인덱싱 상태로 남고 에러를 반환합니다.
    pub async fn upload(&self, user: &str, input: &str) -> Result<BuildSummary> {
        if let Some(existing) = self.user_document(user)? {
            return Err(DocQaError::DocumentAlreadyPresent(
                existing.display_name().to_string(),
            ));
        }

        let staged = stage(input)?;
        self.ingest(user, staged).await
    }

    /// 현재 문서로 인덱스 (재)빌드
    pub async fn build_index(&self, user: &str) -> Result<BuildSummary> {
        let document = self.user_document(user)?.ok_or(DocQaError::NoDocument)?;
        let records = self.load_user_document(&document).await?;
        self.index_records(user, &records).await
    }

    /// 문서와 인덱스 삭제
    ///
    /// 두 단계를 모두 시도하고 하나라도 실패하면 에러를 반환합니다.
    /// 삭제할 것이 있었으면 `true`.
    pub fn delete(&self, user: &str) -> Result<bool> {
        let document = self.user_document(user)?;
        let index_dir = self.user_index_dir(user);
        let had_index = index_dir.exists();

        let file_result = match &document {
            Some(doc) => std::fs::remove_file(&doc.path)
                .map_err(|e| DocQaError::storage("delete document", e)),
            None => Ok(()),
        };
        let index_result = remove_index(&index_dir);

        match (file_result, index_result) {
            (Ok(()), Ok(())) => {
                if let Some(doc) = &document {
                    tracing::info!("Deleted document {} for {}", doc.name, user);
                }
                Ok(document.is_some() || had_index)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(file_err), Err(index_err)) => Err(DocQaError::storage(
                "delete document and index",
                format!("{}; {}", file_err, index_err),
            )),
        }
    }

    /// 문서 교체 (삭제 + 업로드 + 인덱싱)
    ///
    /// 입력 검증과 파일 읽기는 삭제 전에 끝냅니다. 삭제 이후 실패하면
    /// 사용자는 Empty 상태가 되고 `ReplaceFailed`를 반환합니다.
    pub async fn replace(&self, user: &str, input: &str) -> Result<BuildSummary> {
        let staged = stage(input)?;

        self.delete(user)?;

        match self.ingest(user, staged).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::warn!("Replacement for {} failed ({}): {}", user, e.kind(), e);
                if let Err(cleanup) = self.delete(user) {
                    tracing::error!("Cleanup after failed replacement failed: {}", cleanup);
                }
                Err(DocQaError::ReplaceFailed(Box::new(e)))
            }
        }
    }

    /// 사용자 상태
    pub fn status(&self, user: &str) -> Result<UserStatus> {
        Ok(UserStatus {
            document: self.user_document(user)?,
            index: inspect(&self.user_index_dir(user)),
        })
    }

    async fn ingest(&self, user: &str, staged: StagedInput) -> Result<BuildSummary> {
        let dir = self.user_dir(user);
        std::fs::create_dir_all(&dir).map_err(|e| DocQaError::storage("create user directory", e))?;

        let document = match staged {
            StagedInput::File { name, bytes } => {
                let path = dir.join(&name);
                std::fs::write(&path, bytes).map_err(|e| DocQaError::storage("store document", e))?;
                UserDocument { name, path, url: None }
            }
            StagedInput::Url { url, pointer_name } => {
                let path = dir.join(&pointer_name);
                std::fs::write(&path, &url).map_err(|e| DocQaError::storage("store URL pointer", e))?;
                UserDocument {
                    name: pointer_name,
                    path,
                    url: Some(url),
                }
            }
        };
        tracing::info!("Stored document {} for {}", document.display_name(), user);

        let records = match self.load_user_document(&document).await {
            Ok(records) => records,
            Err(e) => {
                // 읽을 수 없는 문서는 남기지 않음
                if let Err(remove) = std::fs::remove_file(&document.path) {
                    tracing::warn!("Failed to remove unreadable document: {}", remove);
                }
                return Err(e);
            }
        };

        self.index_records(user, &records).await
    }

    async fn load_user_document(&self, document: &UserDocument) -> Result<Vec<LoadedRecord>> {
        match &document.url {
            Some(url) => self.loader.load(url).await,
            None => self.loader.load(&document.path.to_string_lossy()).await,
        }
    }

    async fn index_records(&self, user: &str, records: &[LoadedRecord]) -> Result<BuildSummary> {
        let chunks = self.chunker.split_records(records, SourceCategory::User);
        tracing::info!("Split {} records into {} chunks for {}", records.len(), chunks.len(), user);
        self.builder.build(chunks, &self.user_index_dir(user)).await
    }

    // ------------------------------------------------------------------------
    // Global knowledge base
    // ------------------------------------------------------------------------

    /// 공용 지식 베이스 재빌드
    ///
    /// 읽을 수 없는 파일은 경고 후 건너뜁니다. 인덱싱할 청크가 없으면
    /// `EmptyCorpusError`이고 기존 공용 인덱스는 그대로 남습니다.
    pub async fn build_global(&self) -> Result<BuildSummary> {
        let files = list_documents(&self.preloaded_dir(), false);

        let mut chunks: Vec<DocumentChunk> = Vec::new();
        let mut loaded_files = 0usize;
        for path in &files {
            let name = file_name_of(&path.to_string_lossy());
            match self.loader.load(&path.to_string_lossy()).await {
                Ok(records) => {
                    let records: Vec<LoadedRecord> = records
                        .into_iter()
                        .map(|r| {
                            r.with_meta("source_file", &name)
                                .with_meta("source_type", SourceCategory::Global)
                        })
                        .collect();
                    chunks.extend(self.chunker.split_records(&records, SourceCategory::Global));
                    loaded_files += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping preloaded document {} ({}): {}", name, e.kind(), e);
                }
            }
        }

        if chunks.is_empty() {
            return Err(DocQaError::EmptyCorpusError(format!(
                "no readable documents in {}",
                self.preloaded_dir().display()
            )));
        }

        tracing::info!(
            "Building global knowledge base: {} chunks from {} files",
            chunks.len(),
            loaded_files
        );
        self.builder.build(chunks, &self.global_index_dir()).await
    }

    /// 공용 지식 베이스 상태
    pub fn global_status(&self) -> GlobalStatus {
        GlobalStatus {
            documents: list_documents(&self.preloaded_dir(), false)
                .iter()
                .map(|p| file_name_of(&p.to_string_lossy()))
                .collect(),
            index: inspect(&self.global_index_dir()),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 입력을 해석하고 파일이면 내용을 미리 읽음 (기존 문서를 건드리기 전에 수행)
fn stage(input: &str) -> Result<StagedInput> {
    match resolve(input)? {
        ResolvedSource::File { path, .. } => {
            let bytes = std::fs::read(&path).map_err(|e| DocQaError::SourceReadError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            Ok(StagedInput::File {
                name: file_name_of(&path),
                bytes,
            })
        }
        ResolvedSource::Url(url) => {
            let pointer_name = pointer_name_for(&url);
            Ok(StagedInput::Url { url, pointer_name })
        }
    }
}

/// URL 포인터 파일 이름 (`web_<host>.url`)
fn pointer_name_for(url: &str) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "page".to_string());
    let safe: String = host
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("web_{}.{}", safe, URL_POINTER_EXTENSION)
}

fn is_url_pointer(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(URL_POINTER_EXTENSION)
}

/// 디렉토리 바로 아래의 지원 문서 (이름순)
fn list_documents(dir: &Path, include_pointers: bool) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return vec![];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| SourceKind::from_path(p).is_some() || (include_pointers && is_url_pointer(p)))
        .collect();
    files.sort();
    files
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use tempfile::TempDir;

    fn workspace(dir: &Path) -> Workspace {
        Workspace::new(dir, Arc::new(HashEmbedding::new(768))).unwrap()
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_pointer_name() {
        assert_eq!(pointer_name_for("https://www.rbi.org.in/page"), "web_www_rbi_org_in.url");
    }

    #[tokio::test]
    async fn test_upload_then_status_indexed() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        let input = write_file(src.path(), "notes.txt", "Revenue grew 12% in Q2.");
        let summary = ws.upload("alice", &input).await.unwrap();
        assert_eq!(summary.chunk_count, 1);

        let status = ws.status("alice").unwrap();
        match status.state() {
            DocumentState::Indexed(doc) => assert_eq!(doc.name, "notes.txt"),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_upload_rejected() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        ws.upload("alice", &write_file(src.path(), "a.txt", "first")).await.unwrap();
        let err = ws
            .upload("alice", &write_file(src.path(), "b.txt", "second"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::DocumentAlreadyPresent(_)));
        assert_eq!(ws.user_document("alice").unwrap().unwrap().name, "a.txt");
    }

    #[tokio::test]
    async fn test_unsupported_upload_leaves_empty() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        let err = ws
            .upload("alice", &write_file(src.path(), "tool.exe", "MZ"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::UnsupportedSourceType(_)));
        assert_eq!(ws.status("alice").unwrap().state(), DocumentState::Empty);
    }

    #[tokio::test]
    async fn test_empty_document_stays_unindexed() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        let err = ws
            .upload("alice", &write_file(src.path(), "blank.txt", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::EmptyCorpusError(_)));
        assert!(matches!(
            ws.status("alice").unwrap().state(),
            DocumentState::Unindexed(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_both() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        ws.upload("alice", &write_file(src.path(), "a.txt", "content")).await.unwrap();
        assert!(ws.delete("alice").unwrap());

        let status = ws.status("alice").unwrap();
        assert_eq!(status.state(), DocumentState::Empty);
        assert_eq!(status.index, IndexStatus::Missing);
        assert!(!ws.delete("alice").unwrap());
    }

    #[tokio::test]
    async fn test_replace_swaps_document() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        ws.upload("alice", &write_file(src.path(), "old.txt", "old content")).await.unwrap();
        ws.replace("alice", &write_file(src.path(), "new.md", "new content"))
            .await
            .unwrap();

        let doc = ws.user_document("alice").unwrap().unwrap();
        assert_eq!(doc.name, "new.md");
        assert!(!ws.user_dir("alice").join("old.txt").exists());
    }

    #[tokio::test]
    async fn test_replace_with_unsupported_keeps_old() {
        let data = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let ws = workspace(data.path());

        ws.upload("alice", &write_file(src.path(), "old.txt", "old content")).await.unwrap();
        let err = ws
            .replace("alice", &write_file(src.path(), "bad.xyz", "??"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::UnsupportedSourceType(_)));
        assert!(matches!(
            ws.status("alice").unwrap().state(),
            DocumentState::Indexed(_)
        ));
    }

    #[tokio::test]
    async fn test_build_index_without_document() {
        let data = TempDir::new().unwrap();
        let ws = workspace(data.path());
        let err = ws.build_index("alice").await.unwrap_err();
        assert!(matches!(err, DocQaError::NoDocument));
    }

    #[tokio::test]
    async fn test_global_build_skips_bad_files() {
        let data = TempDir::new().unwrap();
        let ws = workspace(data.path());
        let preloaded = ws.preloaded_dir();
        std::fs::create_dir_all(&preloaded).unwrap();
        write_file(&preloaded, "policy.md", "Repo rate is 6.5%.");
        write_file(&preloaded, "broken.pdf", "not a pdf");
        write_file(&preloaded, "ignored.bin", "binary");

        let summary = ws.build_global().await.unwrap();
        assert_eq!(summary.chunk_count, 1);

        let status = ws.global_status();
        assert_eq!(status.documents, vec!["broken.pdf", "policy.md"]);
        assert!(status.index.is_ready());
    }

    #[tokio::test]
    async fn test_global_build_empty_folder() {
        let data = TempDir::new().unwrap();
        let ws = workspace(data.path());
        let err = ws.build_global().await.unwrap_err();
        assert!(matches!(err, DocQaError::EmptyCorpusError(_)));
        assert_eq!(ws.global_status().index, IndexStatus::Missing);
    }
}
