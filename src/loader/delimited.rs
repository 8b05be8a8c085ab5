//! CSV 로더 - 행마다 `header: value` 줄로 이루어진 레코드 생성

use async_trait::async_trait;

use super::{file_name_of, LoadedRecord, SourceKind, SourceLoader};
use crate::error::{DocQaError, Result};

/// CSV 로더 (행별 레코드)
#[derive(Debug, Default)]
pub struct DelimitedLoader;

#[async_trait]
impl SourceLoader for DelimitedLoader {
    async fn load(&self, input: &str) -> Result<Vec<LoadedRecord>> {
        let content = tokio::fs::read_to_string(input)
            .await
            .map_err(|e| DocQaError::SourceReadError {
                path: input.to_string(),
                reason: e.to_string(),
            })?;

        let rows = parse_rows(&content).map_err(|e| DocQaError::SourceReadError {
            path: input.to_string(),
            reason: format!("invalid CSV: {}", e),
        })?;

        let source = file_name_of(input);
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(row, text)| LoadedRecord::new(text, source.clone()).with_meta("row", row))
            .collect())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Delimited
    }
}

/// CSV 본문을 행 텍스트 목록으로 변환
fn parse_rows(content: &str) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let text = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let header = headers.get(i).map(String::as_str).unwrap_or("");
                format!("{}: {}", header, value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        rows.push(text);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows() {
        let csv = "quarter,revenue growth\nQ1,8%\nQ2,12%\n";
        let rows = parse_rows(csv).unwrap();
        assert_eq!(rows, vec!["quarter: Q1\nrevenue growth: 8%", "quarter: Q2\nrevenue growth: 12%"]);
    }

    #[test]
    fn test_ragged_rows_are_accepted() {
        let rows = parse_rows("a,b\n1\n2,3,4\n").unwrap();
        assert_eq!(rows[0], "a: 1");
        assert_eq!(rows[1], "a: 2\nb: 3\n: 4");
    }

    #[tokio::test]
    async fn test_loader_sets_row_metadata() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");
        std::fs::write(&path, "name,value\nalpha,1\nbeta,2\n").unwrap();

        let records = DelimitedLoader.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].metadata.get("row").map(String::as_str), Some("1"));
        assert_eq!(records[1].source, "metrics.csv");
    }
}
