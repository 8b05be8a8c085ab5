//! 에러 타입 - 문서 QA 파이프라인 전반의 실패 분류
//!
//! 로더/청커/인덱스 빌드 에러는 해당 작업(업로드, 교체, 재빌드)을 중단시키고,
//! 검색/답변 단계 에러는 폴백 정책에 따라 흡수됩니다.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// 파이프라인 에러
#[derive(Debug, Error)]
pub enum DocQaError {
    /// 지원하지 않는 확장자이면서 URL로도 해석되지 않는 입력
    #[error("Unsupported source type: {0}")]
    UnsupportedSourceType(String),

    /// URL 가져오기 실패 (네트워크 에러, 200 이외 응답, 추출할 본문 없음)
    #[error("Failed to fetch {url}: {reason}")]
    SourceFetchError { url: String, reason: String },

    /// 로컬 파일 읽기/파싱 실패
    #[error("Failed to read {path}: {reason}")]
    SourceReadError { path: String, reason: String },

    /// 임베딩 모델 호출 실패
    #[error("Embedding service error: {0}")]
    EmbeddingServiceError(String),

    /// 인덱싱할 청크가 없음
    #[error("Nothing to index: {0}")]
    EmptyCorpusError(String),

    /// 인덱스 파일 누락 또는 손상
    #[error("Index at {} is corrupt or incomplete: {reason}", path.display())]
    IndexCorruptOrIncomplete { path: PathBuf, reason: String },

    /// 언어 모델 호출 실패
    #[error("Language model invocation failed: {0}")]
    LlmInvocationError(String),

    /// 사용자당 문서 1개 정책 위반
    #[error("A document is already present ({0}); delete or replace it first")]
    DocumentAlreadyPresent(String),

    /// 업로드된 문서 없음
    #[error("No document uploaded")]
    NoDocument,

    /// 기존 문서 삭제 후 새 문서 처리 실패 (사용자는 Empty 상태)
    #[error("Replacement failed after the previous document was removed: {0}")]
    ReplaceFailed(#[source] Box<DocQaError>),

    /// 파일시스템/DB 에러
    #[error("Storage error during {operation}: {reason}")]
    Storage { operation: String, reason: String },
}

/// 편의 Result 타입
pub type Result<T> = std::result::Result<T, DocQaError>;

impl DocQaError {
    /// Storage 에러 생성 헬퍼
    pub fn storage(operation: &str, err: impl fmt::Display) -> Self {
        Self::Storage {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }

    /// 인덱스 손상 에러 생성 헬퍼
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::IndexCorruptOrIncomplete {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 에러 종류 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedSourceType(_) => "UnsupportedSourceType",
            Self::SourceFetchError { .. } => "SourceFetchError",
            Self::SourceReadError { .. } => "SourceReadError",
            Self::EmbeddingServiceError(_) => "EmbeddingServiceError",
            Self::EmptyCorpusError(_) => "EmptyCorpusError",
            Self::IndexCorruptOrIncomplete { .. } => "IndexCorruptOrIncomplete",
            Self::LlmInvocationError(_) => "LLMInvocationError",
            Self::DocumentAlreadyPresent(_) => "DocumentAlreadyPresent",
            Self::NoDocument => "NoDocument",
            Self::ReplaceFailed(inner) => inner.kind(),
            Self::Storage { .. } => "Storage",
        }
    }

    /// 사용자가 취할 수 있는 조치 (있으면)
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedSourceType(_) => {
                Some("Upload a PDF, Word (.docx), text, Markdown or CSV file, or a web URL.")
            }
            Self::SourceFetchError { .. } => {
                Some("Check that the URL is reachable and serves readable HTML.")
            }
            Self::EmbeddingServiceError(_) | Self::LlmInvocationError(_) => {
                Some("Check GEMINI_API_KEY and network access, then try again.")
            }
            Self::EmptyCorpusError(_) => {
                Some("Place documents in the preloaded_docs folder and rebuild the knowledge base.")
            }
            Self::IndexCorruptOrIncomplete { .. } => Some("Rebuild the index."),
            Self::DocumentAlreadyPresent(_) => Some("Delete or replace the current document."),
            Self::NoDocument => Some("Upload a document first."),
            Self::ReplaceFailed(_) => {
                Some("The previous document is gone; upload a document again.")
            }
            _ => None,
        }
    }

    /// 단계 + 원인 + 조치를 포함한 사용자용 메시지
    pub fn user_message(&self, stage: Stage) -> String {
        match self.hint() {
            Some(hint) => format!("[{}] {} ({})", stage, self, hint),
            None => format!("[{}] {}", stage, self),
        }
    }
}

/// 실패가 발생한 사용자 관점의 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Build,
    Delete,
    Retrieve,
    Answer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upload => "upload",
            Stage::Build => "build",
            Stage::Delete => "delete",
            Stage::Retrieve => "retrieve",
            Stage::Answer => "answer",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_contains_stage_and_hint() {
        let err = DocQaError::corrupt("/tmp/idx", "missing index.vec");
        let msg = err.user_message(Stage::Retrieve);
        assert!(msg.starts_with("[retrieve]"));
        assert!(msg.contains("missing index.vec"));
        assert!(msg.contains("Rebuild the index"));
    }

    #[test]
    fn test_replace_failed_reports_inner_kind() {
        let inner = DocQaError::EmbeddingServiceError("timeout".into());
        let err = DocQaError::ReplaceFailed(Box::new(inner));
        assert_eq!(err.kind(), "EmbeddingServiceError");
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_storage_without_hint() {
        let err = DocQaError::storage("remove document", "permission denied");
        assert_eq!(err.user_message(Stage::Delete), "[delete] Storage error during remove document: permission denied");
    }
}
