//! 웹 로더 - URL 본문 추출
//!
//! article > main > body 순서로 본문 후보를 찾아 태그를 제거한 텍스트를 반환합니다.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{LoadedRecord, SourceKind, SourceLoader};
use crate::error::{DocQaError, Result};

/// 본문 후보 셀렉터 (우선순위 순)
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    ".content",
    "#content",
    "body",
];

/// 본문으로 인정할 최소 길이
const MIN_CONTENT_CHARS: usize = 100;

/// 웹 페이지 로더
pub struct WebLoader {
    client: reqwest::Client,
}

impl WebLoader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("docqa-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DocQaError::storage("create HTTP client", e))?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let fetch_error = |reason: String| DocQaError::SourceFetchError {
            url: url.to_string(),
            reason,
        };

        tracing::info!("Fetching: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(fetch_error(format!("HTTP status {}", status)));
        }

        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

#[async_trait]
impl SourceLoader for WebLoader {
    async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>> {
        let html = self.fetch(input).await?;
        let page = parse_page(&html);

        if page.content.trim().is_empty() {
            return Err(DocQaError::SourceFetchError {
                url: input.to_string(),
                reason: "no extractable content".to_string(),
            });
        }

        let mut record = LoadedRecord::new(page.content, input);
        if let Some(title) = page.title {
            record = record.with_meta("title", title);
        }
        Ok(vec![record])
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }
}

/// 파싱된 페이지
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub content: String,
}

/// HTML에서 제목과 본문 추출
pub fn parse_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    ParsedPage {
        title: extract_title(&document),
        content: extract_content(&document),
    }
}

/// 제목 추출 (<title>, 없으면 <h1>)
fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let title = element.text().collect::<String>().trim().to_string();
        (!title.is_empty()).then_some(title)
    })
}

/// 본문 추출
fn extract_content(document: &Html) -> String {
    let mut fallback = String::new();

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = text_of(&element);
            if text.len() > MIN_CONTENT_CHARS {
                return text;
            }
            if fallback.is_empty() {
                fallback = text;
            }
        }
    }

    fallback
}

/// 요소 텍스트 (스크립트/스타일 제외, 연속 공백 정리)
fn text_of(element: &ElementRef) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let inside_code = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if inside_code {
            continue;
        }
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    match Regex::new(r"\s+") {
        Ok(re) => re.replace_all(&text, " ").trim().to_string(),
        Err(_) => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}
