//! 업데이트 열람 - `scraped_data/<tag>/` 아래 수집된 파일 목록/내용

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{DocQaError, Result};

/// 목록에 포함할 확장자
pub const UPDATE_EXTENSIONS: &[&str] = &["txt", "pdf", "csv", "json", "md", "html"];

/// 업데이트 열람 트레이트
pub trait UpdatesReader: Send + Sync {
    /// 사용 가능한 태그 (사이트 코드) 목록
    fn tags(&self) -> Result<Vec<String>>;

    /// 태그의 파일 목록 (최근 수정 순)
    fn list_files(&self, tag: &str) -> Result<Vec<String>>;

    /// 파일 내용 읽기
    fn read(&self, tag: &str, file_name: &str) -> Result<String>;

    /// 태그 표시 이름
    fn display_name(&self, tag: &str) -> String {
        match tag {
            "RBI" => "Reserve Bank of India".to_string(),
            other => other.to_string(),
        }
    }
}

/// 디렉토리 기반 구현
#[derive(Debug, Clone)]
pub struct DirUpdatesReader {
    root: PathBuf,
}

impl DirUpdatesReader {
    /// `root`는 `scraped_data` 디렉토리
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn is_plain_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != ".."
    }
}

impl UpdatesReader for DirUpdatesReader {
    fn tags(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(vec![]);
        }

        let mut tags: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        tags.sort();
        Ok(tags)
    }

    fn list_files(&self, tag: &str) -> Result<Vec<String>> {
        if !Self::is_plain_name(tag) {
            return Ok(vec![]);
        }
        let dir = self.root.join(tag);
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let mut files: Vec<(SystemTime, String)> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| UPDATE_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
            })
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let modified = e
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                Some((modified, name))
            })
            .collect();

        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(files.into_iter().map(|(_, name)| name).collect())
    }

    fn read(&self, tag: &str, file_name: &str) -> Result<String> {
        if !Self::is_plain_name(tag) || !Self::is_plain_name(file_name) {
            return Err(DocQaError::SourceReadError {
                path: format!("{}/{}", tag, file_name),
                reason: "invalid file name".to_string(),
            });
        }

        let path = self.root.join(tag).join(file_name);
        let bytes = std::fs::read(&path).map_err(|e| DocQaError::SourceReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
