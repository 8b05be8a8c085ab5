//! PDF 로더
//!
//! pdf-extract 크레이트로 텍스트를 추출하고 페이지별 레코드로 나눕니다.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use super::{file_name_of, LoadedRecord, SourceKind, SourceLoader};
use crate::error::{DocQaError, Result};

/// PDF 로더 (페이지별 레코드)
#[derive(Debug, Default)]
pub struct PdfLoader;

#[async_trait]
impl SourceLoader for PdfLoader {
    async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = input.to_string();
        let pages = tokio::task::spawn_blocking(move || extract_pages(Path::new(&path)))
            .await
            .map_err(|e| DocQaError::SourceReadError {
                path: input.to_string(),
                reason: format!("PDF extraction task failed: {}", e),
            })??;

        let source = file_name_of(input);
        let total_pages = pages.len();

        Ok(pages
            .into_iter()
            .map(|(page, text)| {
                LoadedRecord::new(text, source.clone())
                    .with_meta("page", page)
                    .with_meta("total_pages", total_pages)
            })
            .collect())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Pdf
    }
}

/// PDF에서 (페이지 번호, 텍스트) 목록 추출, 페이지 번호는 1부터
pub fn extract_pages(path: &Path) -> Result<Vec<(usize, String)>> {
    let read_error = |reason: String| DocQaError::SourceReadError {
        path: path.display().to_string(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|e| read_error(e.to_string()))?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| read_error(format!("PDF text extraction failed: {}", e)))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// 추출된 텍스트를 페이지별로 분리
fn split_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // "--- Page 1 ---" 형태의 구분자
    if let Ok(page_pattern) =
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
    {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}
