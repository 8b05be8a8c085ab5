//! Answer Synthesizer - 프롬프트 구성과 언어 모델 호출
//!
//! 근거 기반 모드는 질문당 정확히 한 번 모델을 호출합니다.

use std::sync::Arc;

use crate::error::{DocQaError, Result};
use crate::knowledge::RetrievedChunk;
use crate::llm::ChatModel;
use crate::services::{ChatTurn, Role};

/// 프롬프트에 포함할 최근 대화 턴 수
pub const HISTORY_TURNS: usize = 6;

/// 모든 폴백이 실패했을 때의 고정 답변
pub const APOLOGY: &str = "I'm sorry, I encountered an error. Please try again.";

const SINGLE_SOURCE_PREAMBLE: &str = "\
You are an intelligent document analysis AI assistant. Use the following document context to answer questions about the content, extract insights, and provide detailed information from the uploaded documents.

Focus on providing:
- Accurate information directly from the document content
- Clear summaries and explanations of key points
- Specific details and data when available
- Context and background information
- Relevant insights and analysis
- Direct quotes when appropriate

If you don't have enough information to answer completely, clearly state what information is missing and suggest what additional details might be helpful.";

const COMBINED_PREAMBLE: &str = "\
You are an intelligent document analysis AI assistant. You have access to both user-uploaded documents and a preloaded knowledge base of important documents.

Use the following document context to answer questions. The context includes documents from:
- User uploaded documents (marked as 'user_docs')
- Preloaded knowledge base (marked as 'preloaded_docs')

Focus on providing:
- Accurate information directly from the document content
- Clear summaries and explanations of key points
- Specific details and data when available
- Context and background information from both sources
- Relevant insights and analysis
- Direct quotes when appropriate
- Source identification (whether from user docs or knowledge base)

If information is found in both sources, mention both and highlight any differences or complementary information.
If you don't have enough information to answer completely, clearly state what information is missing.";

// ============================================================================
// Prompt Construction
// ============================================================================

/// 컨텍스트 블록: `Source: <origin> - <file>\n<text>`, 블록 사이는 빈 줄
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("Source: {} - {}\n{}", c.origin, c.chunk.source, c.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 최근 대화 블록 (없으면 빈 문자열)
fn format_history(history: &[ChatTurn]) -> String {
    let start = history.len().saturating_sub(HISTORY_TURNS);
    let recent = &history[start..];
    if recent.is_empty() {
        return String::new();
    }

    let lines = recent
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::Human => "User",
                Role::Ai => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("Conversation so far:\n{}\n\n", lines)
}

/// 근거 기반 프롬프트
pub fn build_grounded_prompt(
    question: &str,
    chunks: &[RetrievedChunk],
    history: &[ChatTurn],
    combined: bool,
) -> String {
    let preamble = if combined {
        COMBINED_PREAMBLE
    } else {
        SINGLE_SOURCE_PREAMBLE
    };

    format!(
        "{}\n\n{}Document Context:\n{}\n\nQuestion: {}\n\nAnalysis: ",
        preamble,
        format_history(history),
        format_context(chunks),
        question
    )
}

/// 인덱스 없는 직접 호출 프롬프트 (대화 기록이 없으면 질문 그대로)
pub fn build_direct_prompt(question: &str, history: &[ChatTurn]) -> String {
    let history_block = format_history(history);
    if history_block.is_empty() {
        question.to_string()
    } else {
        format!("{}Question: {}", history_block, question)
    }
}

// ============================================================================
// Synthesizer
// ============================================================================

/// 답변 생성기
pub struct Synthesizer {
    model: Arc<dyn ChatModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// 검색 청크에 근거한 답변 (모델 호출 1회)
    pub async fn grounded(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
        history: &[ChatTurn],
        combined: bool,
    ) -> Result<String> {
        let prompt = build_grounded_prompt(question, chunks, history, combined);
        self.call(&prompt).await
    }

    /// 근거 없이 직접 답변
    pub async fn direct(&self, question: &str, history: &[ChatTurn]) -> Result<String> {
        let prompt = build_direct_prompt(question, history);
        self.call(&prompt).await
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        tracing::debug!("Calling {} ({} chars prompt)", self.model.name(), prompt.len());
        let text = self
            .model
            .generate(prompt)
            .await
            .map_err(|e| DocQaError::LlmInvocationError(format!("{:#}", e)))?;

        if text.trim().is_empty() {
            return Err(DocQaError::LlmInvocationError(
                "model returned an empty response".to_string(),
            ));
        }
        Ok(text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{DocumentChunk, RetrievalSource, SourceCategory};
    use std::collections::BTreeMap;

    fn retrieved(text: &str, source: &str, origin: RetrievalSource) -> RetrievedChunk {
        RetrievedChunk {
            chunk: DocumentChunk {
                text: text.to_string(),
                source: source.to_string(),
                category: SourceCategory::User,
                metadata: BTreeMap::new(),
            },
            origin,
            distance: 0.2,
        }
    }

    #[test]
    fn test_context_block_format() {
        let context = format_context(&[
            retrieved("Revenue grew 12%.", "report.pdf", RetrievalSource::UserDocs),
            retrieved("Policy text.", "policy.pdf", RetrievalSource::PreloadedDocs),
        ]);
        assert_eq!(
            context,
            "Source: user_docs - report.pdf\nRevenue grew 12%.\n\nSource: preloaded_docs - policy.pdf\nPolicy text."
        );
    }

    #[test]
    fn test_grounded_prompt_layout() {
        let chunks = [retrieved("Revenue grew 12%.", "report.pdf", RetrievalSource::UserDocs)];
        let prompt = build_grounded_prompt("What was revenue growth?", &chunks, &[], false);

        assert!(prompt.starts_with("You are an intelligent document analysis AI assistant."));
        assert!(prompt.contains("Document Context:\nSource: user_docs - report.pdf"));
        assert!(prompt.ends_with("Question: What was revenue growth?\n\nAnalysis: "));
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn test_combined_prompt_mentions_both_sources() {
        let prompt = build_grounded_prompt("q", &[], &[], true);
        assert!(prompt.contains("marked as 'preloaded_docs'"));
    }

    #[test]
    fn test_history_keeps_last_turns() {
        let history: Vec<ChatTurn> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::human(format!("question {}", i))
                } else {
                    ChatTurn::ai(format!("answer {}", i))
                }
            })
            .collect();

        let prompt = build_direct_prompt("next?", &history);
        assert!(!prompt.contains("question 2\n"));
        assert!(prompt.contains("User: question 4"));
        assert!(prompt.contains("Assistant: answer 9"));
        assert!(prompt.ends_with("Question: next?"));
    }

    #[test]
    fn test_direct_prompt_is_raw_question() {
        assert_eq!(build_direct_prompt("Hello?", &[]), "Hello?");
    }
}
