//! Session Context - 한 사용자의 대화 세션 상태와 명시적 전이
//!
//! 에이전트는 처음 질문할 때 한 번 선택되어 캐시되고, 문서/지식 베이스가
//! 바뀌는 전이(upload, replace, delete, build_index, rebuild_knowledge_base)와
//! 대화 로드 시 무효화됩니다.

use std::sync::Arc;

use crate::answer::{Agent, AgentSelector, Answer};
use crate::error::Result;
use crate::knowledge::BuildSummary;
use crate::services::{new_conversation_id, ChatTurn, ConversationStore};
use crate::workspace::Workspace;

/// 사용자 세션
pub struct SessionContext {
    user: String,
    workspace: Arc<Workspace>,
    selector: Arc<AgentSelector>,
    conversations: Arc<dyn ConversationStore>,
    conversation_id: Option<String>,
    history: Vec<ChatTurn>,
    agent: Option<Agent>,
}

impl SessionContext {
    pub fn new(
        user: impl Into<String>,
        workspace: Arc<Workspace>,
        selector: Arc<AgentSelector>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            user: user.into(),
            workspace,
            selector,
            conversations,
            conversation_id: None,
            history: Vec::new(),
            agent: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// 캐시된 에이전트 (아직 선택 전이면 None)
    pub fn agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    fn invalidate_agent(&mut self) {
        if self.agent.take().is_some() {
            tracing::debug!("Agent invalidated for {}", self.user);
        }
    }

    // ------------------------------------------------------------------------
    // Conversation transitions
    // ------------------------------------------------------------------------

    /// 새 대화 시작
    pub fn new_conversation(&mut self) -> Result<&str> {
        let id = self.unique_conversation_id()?;
        self.history.clear();
        self.invalidate_agent();
        Ok(self.conversation_id.insert(id).as_str())
    }

    fn unique_conversation_id(&self) -> Result<String> {
        let base = new_conversation_id();
        let existing = self.conversations.list(&self.user)?;

        let mut id = base.clone();
        let mut suffix = 1;
        while existing.iter().any(|c| c.id == id) {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        Ok(id)
    }

    /// 저장된 대화 불러오기
    pub fn load_conversation(&mut self, id: &str) -> Result<()> {
        self.history = self.conversations.load(&self.user, id)?;
        self.conversation_id = Some(id.to_string());
        self.invalidate_agent();
        Ok(())
    }

    /// 대화 삭제 (현재 대화면 세션도 비움)
    pub fn delete_conversation(&mut self, id: &str) -> Result<()> {
        self.conversations.delete(&self.user, id)?;
        if self.conversation_id.as_deref() == Some(id) {
            self.conversation_id = None;
            self.history.clear();
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Document transitions
    // ------------------------------------------------------------------------

    pub async fn upload(&mut self, input: &str) -> Result<BuildSummary> {
        self.invalidate_agent();
        self.workspace.upload(&self.user, input).await
    }

    pub async fn replace(&mut self, input: &str) -> Result<BuildSummary> {
        self.invalidate_agent();
        self.workspace.replace(&self.user, input).await
    }

    pub fn delete_document(&mut self) -> Result<bool> {
        self.invalidate_agent();
        self.workspace.delete(&self.user)
    }

    pub async fn build_index(&mut self) -> Result<BuildSummary> {
        self.invalidate_agent();
        self.workspace.build_index(&self.user).await
    }

    pub async fn rebuild_knowledge_base(&mut self) -> Result<BuildSummary> {
        self.invalidate_agent();
        self.workspace.build_global().await
    }

    // ------------------------------------------------------------------------
    // Asking
    // ------------------------------------------------------------------------

    /// 질문하고 답변을 대화에 기록
    ///
    /// 대화가 없으면 새로 만들고, 저장 실패는 경고만 남깁니다.
    pub async fn ask(&mut self, question: &str) -> Answer {
        if self.conversation_id.is_none() {
            let id = self
                .unique_conversation_id()
                .unwrap_or_else(|_| new_conversation_id());
            tracing::debug!("Starting conversation {}", id);
            self.conversation_id = Some(id);
        }

        let agent = match self.agent.take() {
            Some(agent) => agent,
            None => {
                let agent = self.selector.select(&self.workspace, &self.user);
                for notice in agent.notices() {
                    tracing::warn!("{}", notice);
                }
                agent
            }
        };

        let answer = agent.ask(question, &self.history).await;
        self.agent = Some(agent);

        self.history.push(ChatTurn::human(question));
        self.history.push(ChatTurn::ai(answer.text()));

        if let Some(id) = &self.conversation_id {
            if let Err(e) = self.conversations.save(&self.user, id, &self.history) {
                tracing::warn!("Failed to save conversation {}: {}", id, e);
            }
        }

        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::AgentMode;
    use crate::embedding::{EmbeddingProvider, HashEmbedding};
    use crate::llm::ChatModel;
    use crate::services::FileConversationStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            Ok(format!("echo: {}", prompt.lines().last().unwrap_or_default()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn session(dir: &TempDir) -> SessionContext {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedding::new(768));
        let workspace = Arc::new(Workspace::new(dir.path(), embedder.clone()).unwrap());
        let selector = Arc::new(AgentSelector::new(embedder, Arc::new(EchoModel)));
        let conversations = Arc::new(FileConversationStore::new(workspace.users_root()));
        SessionContext::new("alice", workspace, selector, conversations)
    }

    #[tokio::test]
    async fn test_ask_creates_and_saves_conversation() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);

        let answer = session.ask("Hello?").await;
        assert!(!answer.is_grounded());
        assert_eq!(session.history().len(), 2);

        let id = session.conversation_id().unwrap().to_string();
        let store = FileConversationStore::new(dir.path().join("user_data"));
        assert_eq!(store.load("alice", &id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_invalidates_cached_agent() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);

        session.ask("Hello?").await;
        assert_eq!(session.agent().map(|a| a.mode()), Some(AgentMode::Ungrounded));

        let src = TempDir::new().unwrap();
        let path = src.path().join("notes.txt");
        std::fs::write(&path, "Revenue grew 12% in Q2.").unwrap();
        session.upload(path.to_str().unwrap()).await.unwrap();
        assert!(session.agent().is_none());

        let answer = session.ask("How much did revenue grow?").await;
        assert!(answer.is_grounded());
        assert_eq!(session.agent().map(|a| a.mode()), Some(AgentMode::UserOnly));
    }

    #[tokio::test]
    async fn test_load_and_delete_conversation() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);
        session.ask("First question").await;
        let id = session.conversation_id().unwrap().to_string();

        session.new_conversation().unwrap();
        assert!(session.history().is_empty());
        assert_ne!(session.conversation_id(), Some(id.as_str()));

        session.load_conversation(&id).unwrap();
        assert_eq!(session.history()[0].content, "First question");

        session.delete_conversation(&id).unwrap();
        assert!(session.conversation_id().is_none());
    }
}
