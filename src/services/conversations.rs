//! 대화 기록 저장소
//!
//! 파일 형식: `{"title": ..., "messages": [{"type": "human"|"ai", "content": ...}]}`

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};

/// 제목 최대 길이 (문자 수)
const TITLE_MAX_CHARS: usize = 50;

/// 기본 제목
const DEFAULT_TITLE: &str = "New Chat";

// ============================================================================
// Types
// ============================================================================

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

/// 대화 한 턴
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

/// 대화 목록 항목
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConversationFile {
    title: String,
    messages: Vec<ChatTurn>,
}

/// 첫 사람 메시지로 제목 생성 (50자 초과 시 잘라서 `...`)
pub fn make_title(turns: &[ChatTurn]) -> String {
    match turns.first() {
        Some(first) if first.role == Role::Human => {
            if first.content.chars().count() > TITLE_MAX_CHARS {
                let head: String = first.content.chars().take(TITLE_MAX_CHARS).collect();
                format!("{}...", head)
            } else {
                first.content.clone()
            }
        }
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// 타임스탬프 기반 대화 ID (`chat_YYYYmmdd_HHMMSS`)
pub fn new_conversation_id() -> String {
    format!("chat_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

// ============================================================================
// ConversationStore Trait
// ============================================================================

/// 대화 기록 저장소 트레이트
pub trait ConversationStore: Send + Sync {
    /// 대화 전체 저장 (덮어쓰기)
    fn save(&self, user: &str, id: &str, turns: &[ChatTurn]) -> Result<()>;

    /// 대화 로드 (없으면 빈 목록)
    fn load(&self, user: &str, id: &str) -> Result<Vec<ChatTurn>>;

    /// 대화 목록 (최근 수정 순)
    fn list(&self, user: &str) -> Result<Vec<ConversationSummary>>;

    /// 대화 삭제 (없으면 무시)
    fn delete(&self, user: &str, id: &str) -> Result<()>;
}

// ============================================================================
// FileConversationStore
// ============================================================================

/// `user_data/<user>/chats/` 아래 JSON 파일 저장소
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    users_root: PathBuf,
}

impl FileConversationStore {
    /// `users_root`는 `user_data` 디렉토리
    pub fn new(users_root: impl AsRef<Path>) -> Self {
        Self {
            users_root: users_root.as_ref().to_path_buf(),
        }
    }

    fn chat_dir(&self, user: &str) -> PathBuf {
        self.users_root.join(user).join("chats")
    }

    fn chat_file(&self, user: &str, id: &str) -> PathBuf {
        self.chat_dir(user).join(format!("{}.json", id))
    }
}

impl ConversationStore for FileConversationStore {
    fn save(&self, user: &str, id: &str, turns: &[ChatTurn]) -> Result<()> {
        let dir = self.chat_dir(user);
        std::fs::create_dir_all(&dir).map_err(|e| DocQaError::storage("create chat directory", e))?;

        let file = ConversationFile {
            title: make_title(turns),
            messages: turns.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| DocQaError::storage("encode conversation", e))?;
        std::fs::write(self.chat_file(user, id), content)
            .map_err(|e| DocQaError::storage("write conversation", e))?;

        tracing::debug!("Saved conversation {} ({} turns)", id, turns.len());
        Ok(())
    }

    fn load(&self, user: &str, id: &str) -> Result<Vec<ChatTurn>> {
        let path = self.chat_file(user, id);
        if !path.exists() {
            return Ok(vec![]);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| DocQaError::storage("read conversation", e))?;
        match serde_json::from_str::<ConversationFile>(&content) {
            Ok(file) => Ok(file.messages),
            Err(e) => {
                tracing::warn!("Unreadable conversation {:?}: {}", path, e);
                Ok(vec![])
            }
        }
    }

    fn list(&self, user: &str) -> Result<Vec<ConversationSummary>> {
        let dir = self.chat_dir(user);
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let entries = std::fs::read_dir(&dir).map_err(|e| DocQaError::storage("list conversations", e))?;

        let mut chats: Vec<(SystemTime, ConversationSummary)> = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let title = std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<ConversationFile>(&c).ok())
                .map(|f| f.title)
                .unwrap_or_else(|| id.clone());

            chats.push((modified, ConversationSummary { id, title }));
        }

        chats.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.id.cmp(&a.1.id)));
        Ok(chats.into_iter().map(|(_, summary)| summary).collect())
    }

    fn delete(&self, user: &str, id: &str) -> Result<()> {
        let path = self.chat_file(user, id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| DocQaError::storage("delete conversation", e))?;
            tracing::info!("Deleted conversation {}", id);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
