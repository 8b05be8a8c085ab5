//! Agent Selector - 사용 가능한 인덱스로 답변 모드 결정
//!
//! | 사용자 문서+인덱스 | 공용 인덱스 | 모드 |
//! |---|---|---|
//! | O | O | Combined |
//! | O | X | UserOnly |
//! | X | O | GlobalOnly |
//! | X | X | Ungrounded |
//!
//! 손상된 인덱스는 없는 것으로 취급하고 알림을 남깁니다.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::synthesizer::{Synthesizer, APOLOGY};
use super::{collect_sources, Answer, UngroundedReason};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{inspect, IndexStatus, Retriever, VectorIndex};
use crate::llm::ChatModel;
use crate::services::ChatTurn;
use crate::workspace::Workspace;

// ============================================================================
// AgentMode
// ============================================================================

/// 답변 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// 사용자 문서 + 공용 지식 베이스
    Combined,
    /// 사용자 문서만
    UserOnly,
    /// 공용 지식 베이스만
    GlobalOnly,
    /// 인덱스 없음, 모델 직접 호출
    Ungrounded,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentMode::Combined => "user documents + knowledge base",
            AgentMode::UserOnly => "user documents",
            AgentMode::GlobalOnly => "knowledge base",
            AgentMode::Ungrounded => "general (no documents)",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Agent
// ============================================================================

/// 선택된 모드로 질문에 답하는 에이전트
pub struct Agent {
    mode: AgentMode,
    retriever: Retriever,
    synthesizer: Synthesizer,
    notices: Vec<String>,
}

impl Agent {
    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// 선택 과정에서 발생한 알림 (손상된 인덱스 등)
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// 질문에 답변 (실패하지 않음)
    pub async fn ask(&self, question: &str, history: &[ChatTurn]) -> Answer {
        if self.mode == AgentMode::Ungrounded {
            return self.fallback(question, history, UngroundedReason::NoIndex).await;
        }

        let chunks = match self.retriever.retrieve(question).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Retrieval failed ({}): {}. Falling back to direct answer.", e.kind(), e);
                return self
                    .fallback(question, history, UngroundedReason::RetrievalFailed)
                    .await;
            }
        };

        if chunks.is_empty() {
            tracing::warn!("No chunks retrieved. Falling back to direct answer.");
            return self.fallback(question, history, UngroundedReason::NoContext).await;
        }

        let combined = self.mode == AgentMode::Combined;
        match self
            .synthesizer
            .grounded(question, &chunks, history, combined)
            .await
        {
            Ok(text) => Answer::Grounded {
                text,
                sources: collect_sources(&chunks),
            },
            Err(e) => {
                tracing::warn!(
                    "Grounded synthesis failed ({}): {}. Falling back to direct answer.",
                    e.kind(),
                    e
                );
                self.fallback(question, history, UngroundedReason::SynthesisFailed)
                    .await
            }
        }
    }

    /// 직접 답변으로 대체
    ///
    /// 검색이나 근거 기반 생성이 실패한 경우에는 대화 기록 없이 질문만 보냄
    async fn fallback(&self, question: &str, history: &[ChatTurn], reason: UngroundedReason) -> Answer {
        let history: &[ChatTurn] = match reason {
            UngroundedReason::RetrievalFailed | UngroundedReason::SynthesisFailed => &[],
            _ => history,
        };

        match self.synthesizer.direct(question, history).await {
            Ok(text) => Answer::Ungrounded { text, reason },
            Err(e) => {
                tracing::error!("Direct answer failed ({}): {}", e.kind(), e);
                Answer::Ungrounded {
                    text: APOLOGY.to_string(),
                    reason: UngroundedReason::ModelUnavailable,
                }
            }
        }
    }
}

// ============================================================================
// AgentSelector
// ============================================================================

/// 에이전트 선택기
pub struct AgentSelector {
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn ChatModel>,
}

impl AgentSelector {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, model: Arc<dyn ChatModel>) -> Self {
        Self { embedder, model }
    }

    /// 사용자의 현재 상태로 에이전트 구성
    pub fn select(&self, workspace: &Workspace, user: &str) -> Agent {
        let mut notices = Vec::new();

        let user_index = match workspace.user_document(user) {
            Ok(Some(_)) => load_if_present(
                &workspace.user_index_dir(user),
                "user document",
                self.embedder.as_ref(),
                &mut notices,
            ),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not read user document state ({}): {}", e.kind(), e);
                notices.push(format!("사용자 문서 상태를 확인할 수 없습니다: {}", e));
                None
            }
        };
        let global_index = load_if_present(
            &workspace.global_index_dir(),
            "knowledge base",
            self.embedder.as_ref(),
            &mut notices,
        );

        let mode = match (user_index.is_some(), global_index.is_some()) {
            (true, true) => AgentMode::Combined,
            (true, false) => AgentMode::UserOnly,
            (false, true) => AgentMode::GlobalOnly,
            (false, false) => AgentMode::Ungrounded,
        };
        tracing::info!("Selected agent mode for {}: {:?}", user, mode);

        Agent {
            mode,
            retriever: Retriever::new(self.embedder.clone(), user_index, global_index),
            synthesizer: Synthesizer::new(self.model.clone()),
            notices,
        }
    }
}

/// 인덱스가 준비되어 있으면 로드, 손상되었거나 다른 임베더로 만든 인덱스면 알림 후 None
fn load_if_present(
    dir: &Path,
    label: &str,
    embedder: &dyn EmbeddingProvider,
    notices: &mut Vec<String>,
) -> Option<Arc<VectorIndex>> {
    if inspect(dir) == IndexStatus::Missing {
        return None;
    }

    let loaded = VectorIndex::load(dir).and_then(|index| {
        index.ensure_embedder(embedder.name(), embedder.dimension())?;
        Ok(index)
    });

    match loaded {
        Ok(index) => Some(Arc::new(index)),
        Err(e) => {
            tracing::warn!("Ignoring {} index ({}): {}", label, e.kind(), e);
            notices.push(format!(
                "{} 인덱스를 사용할 수 없어 제외했습니다. 다시 빌드하세요. ({})",
                label, e
            ));
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
