//! 외부 협력자 인터페이스와 파일 기반 구현
//!
//! - [`CredentialStore`]: 사용자 등록/인증 (`users.json`)
//! - [`ConversationStore`]: 대화 기록 (`user_data/<user>/chats/<id>.json`)
//! - [`UpdatesReader`]: 수집된 업데이트 파일 열람 (`scraped_data/<tag>/`)

mod conversations;
mod credentials;
mod updates;

pub use conversations::{
    make_title, new_conversation_id, ChatTurn, ConversationStore, ConversationSummary,
    FileConversationStore, Role,
};
pub use credentials::{hash_password, is_valid_username, CredentialStore, FileCredentialStore};
pub use updates::{DirUpdatesReader, UpdatesReader, UPDATE_EXTENSIONS};
