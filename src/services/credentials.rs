//! 자격 증명 저장소 - 사용자 이름 → SHA-256 hex 해시 JSON 맵

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{DocQaError, Result};

/// 자격 증명 저장소 트레이트
pub trait CredentialStore: Send + Sync {
    /// 사용자 이름/비밀번호 확인
    fn verify(&self, username: &str, password: &str) -> Result<bool>;

    /// 새 사용자 등록, 이미 있으면 `false`
    fn register(&self, username: &str, password: &str) -> Result<bool>;
}

/// 비밀번호 SHA-256 hex
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 사용자 이름 검증 (디렉토리 이름으로 쓰이므로 영숫자, `-`, `_`, `.`만 허용)
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username != "."
        && username != ".."
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// `users.json` 기반 저장소
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 데이터 디렉토리의 `users.json`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("users.json"))
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| DocQaError::storage("read users.json", e))?;
        serde_json::from_str(&content).map_err(|e| DocQaError::storage("parse users.json", e))
    }

    fn write(&self, users: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DocQaError::storage("create data directory", e))?;
        }
        let content = serde_json::to_string_pretty(users)
            .map_err(|e| DocQaError::storage("encode users.json", e))?;
        std::fs::write(&self.path, content).map_err(|e| DocQaError::storage("write users.json", e))
    }
}

impl CredentialStore for FileCredentialStore {
    fn verify(&self, username: &str, password: &str) -> Result<bool> {
        let users = self.read()?;
        Ok(users
            .get(username)
            .map(|stored| *stored == hash_password(password))
            .unwrap_or(false))
    }

    fn register(&self, username: &str, password: &str) -> Result<bool> {
        if !is_valid_username(username) {
            return Err(DocQaError::storage(
                "register user",
                format!("invalid user name '{}'", username),
            ));
        }
        let mut users = self.read()?;
        if users.contains_key(username) {
            return Ok(false);
        }
        users.insert(username.to_string(), hash_password(password));
        self.write(&users)?;
        tracing::info!("Registered user: {}", username);
        Ok(true)
    }
}
