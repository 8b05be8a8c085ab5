//! docqa-rag - 문서 기반 질의응답 RAG 엔진
//!
//! 사용자별 문서 1개와 공용 지식 베이스를 각각 벡터 인덱스로 만들고,
//! 사용 가능한 인덱스에 따라 답변 모드를 선택해 근거 기반 답변을 생성합니다.

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod services;
pub mod session;
pub mod workspace;

// Re-exports
pub use answer::{Agent, AgentMode, AgentSelector, Answer, SourceRef, Synthesizer, UngroundedReason};
pub use config::{Config, EmbedderKind};
pub use embedding::{create_embedder, has_api_key, EmbeddingProvider, GeminiEmbedding, HashEmbedding};
pub use error::{DocQaError, Result, Stage};
pub use knowledge::{
    default_chunker, BuildSummary, ChunkConfig, Chunker, DocumentChunk, IndexBuilder, IndexStatus,
    RecursiveChunker, RetrievalSource, RetrievedChunk, Retriever, SourceCategory, VectorIndex,
};
pub use llm::{create_chat_model, ChatModel, GeminiChat};
pub use loader::{DocumentLoader, LoadedRecord, SourceKind};
pub use services::{
    ChatTurn, ConversationStore, CredentialStore, DirUpdatesReader, FileConversationStore,
    FileCredentialStore, Role, UpdatesReader,
};
pub use session::SessionContext;
pub use workspace::{DocumentState, UserDocument, Workspace};
