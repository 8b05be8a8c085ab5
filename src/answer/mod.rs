//! 답변 모듈 - 에이전트 선택, 근거 기반 답변 생성, 폴백 정책
//!
//! 폴백 순서: 근거 기반 답변 → 원 질문 직접 호출 (Ungrounded) → 고정 사과 문구.
//! 한 턴은 실패하지 않고 항상 [`Answer`]를 반환합니다.

mod selector;
mod synthesizer;

use std::fmt;

use crate::knowledge::{RetrievalSource, RetrievedChunk};

pub use selector::{Agent, AgentMode, AgentSelector};
pub use synthesizer::{
    build_direct_prompt, build_grounded_prompt, format_context, Synthesizer, APOLOGY,
    HISTORY_TURNS,
};

// ============================================================================
// Types
// ============================================================================

/// 답변의 근거 출처
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub origin: RetrievalSource,
    pub source: String,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.origin, self.source)
    }
}

/// 근거 없이 답한 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UngroundedReason {
    /// 사용할 인덱스가 없음
    NoIndex,
    /// 검색 결과가 비어 있음
    NoContext,
    /// 검색 단계 실패
    RetrievalFailed,
    /// 근거 기반 생성 실패
    SynthesisFailed,
    /// 직접 호출까지 실패 (사과 문구)
    ModelUnavailable,
}

impl fmt::Display for UngroundedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UngroundedReason::NoIndex => "no index available",
            UngroundedReason::NoContext => "no relevant context found",
            UngroundedReason::RetrievalFailed => "retrieval failed",
            UngroundedReason::SynthesisFailed => "grounded synthesis failed",
            UngroundedReason::ModelUnavailable => "language model unavailable",
        };
        f.write_str(label)
    }
}

/// 한 질문에 대한 답변
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// 검색된 문서에 근거한 답변
    Grounded { text: String, sources: Vec<SourceRef> },
    /// 문서 근거 없는 답변
    Ungrounded { text: String, reason: UngroundedReason },
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Grounded { text, .. } | Answer::Ungrounded { text, .. } => text,
        }
    }

    pub fn is_grounded(&self) -> bool {
        matches!(self, Answer::Grounded { .. })
    }

    pub fn sources(&self) -> &[SourceRef] {
        match self {
            Answer::Grounded { sources, .. } => sources,
            Answer::Ungrounded { .. } => &[],
        }
    }
}

/// 검색 청크에서 중복 없는 출처 목록 (등장 순서 유지)
pub fn collect_sources(chunks: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for chunk in chunks {
        let source = SourceRef {
            origin: chunk.origin,
            source: chunk.chunk.source.clone(),
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
