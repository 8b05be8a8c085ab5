//! Word (.docx) 로더
//!
//! docx는 zip 컨테이너이므로 `word/document.xml`을 읽어 `<w:p>` 문단의
//! `<w:t>` 텍스트 런을 이어 붙입니다. 문단은 빈 줄로 구분해 청커가 문단 경계를
//! 우선 사용할 수 있게 합니다.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use regex::Regex;

use super::{file_name_of, LoadedRecord, SourceKind, SourceLoader};
use crate::error::{DocQaError, Result};

const DOCUMENT_XML: &str = "word/document.xml";

/// Word 문서 로더
#[derive(Debug, Default)]
pub struct WordLoader;

#[async_trait]
impl SourceLoader for WordLoader {
    async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| DocQaError::SourceReadError {
                path: input.to_string(),
                reason: e.to_string(),
            })?;

        let paragraphs = extract_paragraphs(&bytes).map_err(|reason| {
            DocQaError::SourceReadError {
                path: input.to_string(),
                reason,
            }
        })?;

        if paragraphs.is_empty() {
            return Ok(vec![]);
        }

        let count = paragraphs.len();
        Ok(vec![LoadedRecord::new(paragraphs.join("\n\n"), file_name_of(input))
            .with_meta("paragraphs", count)])
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Word
    }
}

/// docx 바이트에서 비어있지 않은 문단 목록 추출
pub fn extract_paragraphs(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a docx archive: {}", e))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .map_err(|e| format!("missing {}: {}", DOCUMENT_XML, e))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("failed to read {}: {}", DOCUMENT_XML, e))?;

    paragraphs_from_xml(&xml)
}

/// document.xml 본문에서 문단 텍스트 추출
fn paragraphs_from_xml(xml: &str) -> std::result::Result<Vec<String>, String> {
    let paragraph_re = Regex::new(r"(?s)<w:p[ >].*?</w:p>").map_err(|e| e.to_string())?;
    let run_re = Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").map_err(|e| e.to_string())?;
    let entity_re = entity_regex()?;

    let paragraphs = paragraph_re
        .find_iter(xml)
        .map(|p| {
            run_re
                .captures_iter(p.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| decode_entities(&entity_re, m.as_str()))
                .collect::<String>()
        })
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    Ok(paragraphs)
}

fn entity_regex() -> std::result::Result<Regex, String> {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").map_err(|e| e.to_string())
}

/// XML 엔티티 디코딩 (기본 엔티티 + `&#NNN;` / `&#xHH;` 문자 참조)
///
/// 한 번에 치환하므로 `&amp;lt;`는 `&lt;`로 남음. 잘못된 문자 참조는 그대로 둠
fn decode_entities(entity_re: &Regex, text: &str) -> String {
    entity_re
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let number = &entity[1..];
                    let code = match number.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => number.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_from_xml() {
        let xml = r#"<w:document><w:body>
            <w:p><w:pPr><w:pStyle w:val="Title"/></w:pPr><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> Report</w:t></w:r></w:p>
            <w:p/>
            <w:p w:rsidR="00A1"><w:r><w:t>Revenue grew 12% &amp; margins held.</w:t></w:r></w:p>
        </w:body></w:document>"#;

        let paragraphs = paragraphs_from_xml(xml).unwrap();
        assert_eq!(
            paragraphs,
            vec!["Quarterly Report", "Revenue grew 12% & margins held."]
        );
    }

    #[test]
    fn test_decode_entities() {
        let re = entity_regex().unwrap();
        assert_eq!(decode_entities(&re, "a &lt;b&gt; &amp;amp;"), "a <b> &amp;");
        assert_eq!(decode_entities(&re, "Bank&#8217;s &#x2014; Q2"), "Bank\u{2019}s \u{2014} Q2");
        assert_eq!(decode_entities(&re, "bad &#xD800; ref"), "bad &#xD800; ref");
    }

    fn write_docx(path: &std::path::Path, paragraphs: &[&str]) {
        use std::io::Write;

        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );

        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(DOCUMENT_XML, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn test_docx_through_document_loader() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("memo.docx");
        write_docx(&path, &["Revenue grew 12% in Q2.", "Bank&#8217;s outlook."]);

        let records = crate::loader::DocumentLoader::new()
            .unwrap()
            .load(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| !r.text.trim().is_empty()));
        assert_eq!(records[0].source, "memo.docx");
        assert_eq!(records[0].text, "Revenue grew 12% in Q2.\n\nBank\u{2019}s outlook.");
    }

    #[test]
    fn test_not_a_zip() {
        assert!(extract_paragraphs(b"plain text").is_err());
    }
}
