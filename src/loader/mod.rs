//! 문서 로더 모듈
//!
//! 파일 경로 또는 URL을 (텍스트, 메타데이터) 레코드 목록으로 변환합니다.
//! - PDF: 페이지별 레코드
//! - Word (.docx): 문단 구조를 보존한 단일 레코드
//! - CSV: 행별 레코드
//! - 텍스트/마크다운: 파일 전체 단일 레코드
//! - URL: 본문 추출 단일 레코드

pub mod delimited;
pub mod docx;
pub mod pdf;
pub mod web;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{DocQaError, Result};

pub use delimited::DelimitedLoader;
pub use docx::WordLoader;
pub use pdf::PdfLoader;
pub use web::WebLoader;

// ============================================================================
// Types
// ============================================================================

/// 로드된 텍스트 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecord {
    /// 추출된 텍스트
    pub text: String,
    /// 출처 식별자 (파일 이름 또는 URL)
    pub source: String,
    /// 위치 메타데이터 (page, row 등)
    pub metadata: BTreeMap<String, String>,
}

impl LoadedRecord {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// 메타데이터 추가 (builder)
    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// 로더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Pdf,
    Word,
    Text,
    Delimited,
    Web,
}

/// 확장자 → 로더 종류 조회 테이블
const EXTENSION_TABLE: &[(&str, SourceKind)] = &[
    ("pdf", SourceKind::Pdf),
    ("docx", SourceKind::Word),
    ("txt", SourceKind::Text),
    ("md", SourceKind::Text),
    ("csv", SourceKind::Delimited),
];

impl SourceKind {
    /// 확장자로 종류 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, kind)| *kind)
    }

    /// 파일 경로에서 종류 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 지원하는 파일 확장자 목록
    pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
        EXTENSION_TABLE.iter().map(|(e, _)| *e)
    }
}

/// 입력 해석 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    /// 로컬 파일
    File { path: String, kind: SourceKind },
    /// 정규화된 URL
    Url(String),
}

/// 입력 문자열을 로컬 파일 또는 URL로 해석
///
/// 1. 존재하는 경로면 확장자로 분기 (모르는 확장자는 `UnsupportedSourceType`)
/// 2. http(s) URL이면 그대로 사용, 다른 스킴은 거부
/// 3. 스킴 없는 호스트 형태면 `https://`를 붙임 (`example.com/report.pdf` 포함)
/// 4. 남은 문서 확장자 경로는 `SourceReadError`
pub fn resolve(input: &str) -> Result<ResolvedSource> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DocQaError::UnsupportedSourceType("empty input".to_string()));
    }

    let path = Path::new(input);
    if path.is_file() {
        return match SourceKind::from_path(path) {
            Some(kind) => Ok(ResolvedSource::File {
                path: input.to_string(),
                kind,
            }),
            None => Err(DocQaError::UnsupportedSourceType(format!(
                "{} (unknown extension)",
                input
            ))),
        };
    }

    if input.contains("://") {
        return match url::Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
                Ok(ResolvedSource::Url(url.to_string()))
            }
            _ => Err(DocQaError::UnsupportedSourceType(input.to_string())),
        };
    }

    if looks_like_host(input) {
        if let Ok(url) = url::Url::parse(&format!("https://{}", input)) {
            if url.host().is_some() {
                return Ok(ResolvedSource::Url(url.to_string()));
            }
        }
    }

    if SourceKind::from_path(path).is_some() {
        return Err(DocQaError::SourceReadError {
            path: input.to_string(),
            reason: "file not found".to_string(),
        });
    }

    Err(DocQaError::UnsupportedSourceType(input.to_string()))
}

/// 첫 세그먼트가 호스트 이름처럼 보이는지
///
/// `report.pdf`처럼 첫 세그먼트 자체가 문서 파일 이름이면 호스트가 아님
fn looks_like_host(input: &str) -> bool {
    if input.contains(char::is_whitespace) || input.starts_with(['.', '/', '\\']) {
        return false;
    }
    let Some(host) = input.split('/').next() else {
        return false;
    };
    match host.rsplit_once('.') {
        Some((name, tld)) => {
            !name.is_empty() && !tld.is_empty() && SourceKind::from_extension(tld).is_none()
        }
        None => false,
    }
}

/// 파일 이름 (경로의 마지막 요소)
pub fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

// ============================================================================
// SourceLoader Trait
// ============================================================================

/// 단일 소스 종류 로더
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// 입력(파일 경로 또는 URL)을 레코드로 변환
    async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>>;

    /// 로더 종류
    fn kind(&self) -> SourceKind;
}

/// 텍스트/마크다운 로더 (파일 전체를 하나의 레코드로)
#[derive(Debug, Default)]
pub struct TextLoader;

#[async_trait]
impl SourceLoader for TextLoader {
    async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>> {
        let text = tokio::fs::read_to_string(input)
            .await
            .map_err(|e| DocQaError::SourceReadError {
                path: input.to_string(),
                reason: e.to_string(),
            })?;

        Ok(vec![LoadedRecord::new(text, file_name_of(input))])
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Text
    }
}

// ============================================================================
// DocumentLoader
// ============================================================================

/// 입력 종류에 따라 로더를 선택하는 디스패처
pub struct DocumentLoader {
    pdf: PdfLoader,
    word: WordLoader,
    text: TextLoader,
    delimited: DelimitedLoader,
    web: WebLoader,
}

impl DocumentLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pdf: PdfLoader,
            word: WordLoader,
            text: TextLoader,
            delimited: DelimitedLoader,
            web: WebLoader::new()?,
        })
    }

    /// 종류별 로더 조회
    pub fn loader_for(&self, kind: SourceKind) -> &dyn SourceLoader {
        match kind {
            SourceKind::Pdf => &self.pdf,
            SourceKind::Word => &self.word,
            SourceKind::Text => &self.text,
            SourceKind::Delimited => &self.delimited,
            SourceKind::Web => &self.web,
        }
    }

    /// 파일 경로 또는 URL 로드
    pub async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>> {
        let records = match resolve(input)? {
            ResolvedSource::File { path, kind } => {
                tracing::debug!("Loading {:?} file: {}", kind, path);
                self.loader_for(kind).load(&path).await?
            }
            ResolvedSource::Url(url) => self.web.load(&url).await?,
        };

        let records: Vec<LoadedRecord> = records
            .into_iter()
            .filter(|r| !r.text.trim().is_empty())
            .collect();

        tracing::info!("Loaded {} record(s) from {}", records.len(), input);
        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_table() {
        assert_eq!(SourceKind::from_extension("PDF"), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::from_extension("docx"), Some(SourceKind::Word));
        assert_eq!(SourceKind::from_extension("md"), Some(SourceKind::Text));
        assert_eq!(SourceKind::from_extension("csv"), Some(SourceKind::Delimited));
        assert_eq!(SourceKind::from_extension("exe"), None);
    }

    #[test]
    fn test_resolve_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let resolved = resolve(path.to_str().unwrap()).unwrap();
        assert!(matches!(resolved, ResolvedSource::File { kind: SourceKind::Text, .. }));
    }

    #[test]
    fn test_resolve_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.xyz");
        std::fs::write(&path, "data").unwrap();

        let err = resolve(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, DocQaError::UnsupportedSourceType(_)));
    }

    #[test]
    fn test_resolve_urls() {
        assert_eq!(
            resolve("https://example.com/a").unwrap(),
            ResolvedSource::Url("https://example.com/a".to_string())
        );
        assert_eq!(
            resolve("example.com/page").unwrap(),
            ResolvedSource::Url("https://example.com/page".to_string())
        );
        assert!(matches!(
            resolve("ftp://example.com/file"),
            Err(DocQaError::UnsupportedSourceType(_))
        ));
        assert!(matches!(
            resolve("not a url"),
            Err(DocQaError::UnsupportedSourceType(_))
        ));
    }

    #[test]
    fn test_resolve_missing_document_file() {
        let err = resolve("/definitely/missing/report.pdf").unwrap_err();
        assert!(matches!(err, DocQaError::SourceReadError { .. }));

        let err = resolve("report.pdf").unwrap_err();
        assert!(matches!(err, DocQaError::SourceReadError { .. }));
    }

    #[test]
    fn test_resolve_host_with_document_extension() {
        assert_eq!(
            resolve("example.com/report.pdf").unwrap(),
            ResolvedSource::Url("https://example.com/report.pdf".to_string())
        );
        assert_eq!(
            resolve("www.rbi.org.in/notice.txt").unwrap(),
            ResolvedSource::Url("https://www.rbi.org.in/notice.txt".to_string())
        );
    }

    #[tokio::test]
    async fn test_text_loader_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nBody text.").unwrap();

        let loader = DocumentLoader::new().unwrap();
        let records = loader.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "notes.md");
        assert!(records[0].text.contains("Body text."));
    }

    #[tokio::test]
    async fn test_empty_file_yields_no_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();

        let loader = DocumentLoader::new().unwrap();
        let records = loader.load(path.to_str().unwrap()).await.unwrap();
        assert!(records.is_empty());
    }
}
