//! 통합 테스트 공용 도우미

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use docqa_rag::{ChatModel, EmbeddingProvider, HashEmbedding, Workspace};
use tempfile::TempDir;

pub const DIMENSION: usize = 768;

/// 문서 컨텍스트에서 `%`가 들어간 줄을 그대로 돌려주는 모델
pub struct ContextModel;

#[async_trait]
impl ChatModel for ContextModel {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let context = prompt
            .split_once("Document Context:")
            .map(|(_, rest)| rest.split("Question:").next().unwrap_or_default())
            .unwrap_or_default();

        Ok(context
            .lines()
            .find(|line| line.contains('%'))
            .map(|line| line.trim().to_string())
            .unwrap_or_else(|| "I don't know.".to_string()))
    }

    fn name(&self) -> &str {
        "context"
    }
}

/// 항상 실패하는 모델
pub struct DownModel;

#[async_trait]
impl ChatModel for DownModel {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("503 service unavailable")
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// 항상 실패하는 임베딩
pub struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding quota exceeded")
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn name(&self) -> &str {
        "down"
    }
}

pub fn hash_embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashEmbedding::new(DIMENSION))
}

pub fn workspace(dir: &TempDir) -> Arc<Workspace> {
    Arc::new(Workspace::new(dir.path(), hash_embedder()).unwrap())
}

/// 한 페이지짜리 최소 PDF (Helvetica, 한 줄에 한 문장)
pub fn minimal_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 12 Tf\n14 TL\n72 720 Td\n");
    for line in lines {
        let escaped = line
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        content.push_str(&format!("({}) Tj\nT*\n", escaped));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));
    pdf.into_bytes()
}
