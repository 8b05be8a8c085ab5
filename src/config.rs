//! 설정 모듈 - 데이터 디렉토리, API 키, 모델 설정
//!
//! 설정 파일 없이 환경변수 + 기본값으로 구성합니다.
//!
//! | 환경변수 | 설명 |
//! |---|---|
//! | `DOCQA_DATA_DIR` | 데이터 디렉토리 (기본: `~/.docqa-rag`) |
//! | `GEMINI_API_KEY` / `GOOGLE_AI_API_KEY` | Gemini API 키 |
//! | `DOCQA_CHAT_MODEL` | 답변 생성 모델 (기본: `gemini-1.5-flash`) |
//! | `DOCQA_EMBEDDER` | `gemini` (기본) 또는 `hash` (오프라인) |

use std::path::{Path, PathBuf};

use crate::embedding::DEFAULT_DIMENSION;

/// 기본 답변 생성 모델
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";

/// 기본 생성 temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// 사용할 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Gemini API (gemini-embedding-001)
    Gemini,
    /// 로컬 해시 임베딩 (API 불필요)
    Hash,
}

impl EmbedderKind {
    fn from_env_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "hash" | "local" | "offline" => EmbedderKind::Hash,
            _ => EmbedderKind::Gemini,
        }
    }
}

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 데이터 루트 (user_data/, preloaded_docs/, global_knowledge_base/ 등)
    pub data_dir: PathBuf,
    /// 임베딩 프로바이더
    pub embedder: EmbedderKind,
    /// 임베딩 차원
    pub embedding_dimension: usize,
    /// 답변 생성 모델 이름
    pub chat_model: String,
    /// 생성 temperature
    pub temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedder: EmbedderKind::Gemini,
            embedding_dimension: DEFAULT_DIMENSION,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl Config {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = non_empty_env("DOCQA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = non_empty_env("DOCQA_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(kind) = non_empty_env("DOCQA_EMBEDDER") {
            config.embedder = EmbedderKind::from_env_value(&kind);
        }

        tracing::debug!("Loaded config: {:?}", config);
        config
    }

    /// 데이터 디렉토리 지정
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    /// 임베딩 프로바이더 지정
    pub fn with_embedder(mut self, embedder: EmbedderKind) -> Self {
        self.embedder = embedder;
        self
    }
}

/// 기본 데이터 디렉토리 (~/.docqa-rag/)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
