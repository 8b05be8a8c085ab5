//! CLI 모듈
//!
//! docqa CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::answer::{AgentSelector, Answer};
use crate::config::Config;
use crate::embedding::{create_embedder, has_api_key, EmbeddingProvider};
use crate::error::{DocQaError, Stage};
use crate::knowledge::{BuildSummary, IndexStatus};
use crate::llm::create_chat_model;
use crate::services::{
    ConversationStore, CredentialStore, DirUpdatesReader, FileConversationStore,
    FileCredentialStore, Role, UpdatesReader,
};
use crate::session::SessionContext;
use crate::workspace::{DocumentState, Workspace};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa")]
#[command(version, about = "문서 기반 질의응답 (RAG) 시스템", long_about = None)]
pub struct Cli {
    /// 사용자 이름
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// 비밀번호
    #[arg(short, long, global = true)]
    pub password: Option<String>,

    /// 데이터 디렉토리 (기본: DOCQA_DATA_DIR 또는 ~/.docqa-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 사용자 등록
    Register,

    /// 문서 또는 URL 업로드 후 인덱싱 (사용자당 1개)
    Upload {
        /// 파일 경로 또는 URL
        input: String,
    },

    /// 현재 문서를 새 문서로 교체
    Replace {
        /// 파일 경로 또는 URL
        input: String,
    },

    /// 현재 문서와 인덱스 삭제
    Delete,

    /// 현재 문서로 인덱스 재빌드
    BuildIndex,

    /// 문서/인덱스 상태 확인
    Status,

    /// 공용 지식 베이스 관리
    Kb {
        #[command(subcommand)]
        action: KbCommand,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        /// 이어서 질문할 대화 ID
        #[arg(short, long)]
        chat: Option<String>,
    },

    /// 대화형 모드 (빈 줄 또는 /quit 으로 종료, /new 로 새 대화)
    Chat {
        /// 불러올 대화 ID
        #[arg(short, long)]
        chat: Option<String>,
    },

    /// 저장된 대화 관리
    Chats {
        #[command(subcommand)]
        action: ChatsCommand,
    },

    /// 수집된 업데이트 열람
    Updates {
        #[command(subcommand)]
        action: UpdatesCommand,
    },
}

#[derive(Subcommand)]
pub enum KbCommand {
    /// preloaded_docs 폴더로 공용 지식 베이스 재빌드
    Build,
    /// 공용 지식 베이스 상태
    Status,
}

#[derive(Subcommand)]
pub enum ChatsCommand {
    /// 대화 목록 (최근 순)
    List,
    /// 대화 내용 보기
    Show { id: String },
    /// 대화 삭제
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum UpdatesCommand {
    /// 태그 목록, 또는 태그의 파일 목록
    List { tag: Option<String> },
    /// 파일 내용 보기
    Read { tag: String, file: String },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }

    match &cli.command {
        Commands::Register => cmd_register(&cli, &config),
        Commands::Upload { input } => cmd_upload(&cli, &config, input, false).await,
        Commands::Replace { input } => cmd_upload(&cli, &config, input, true).await,
        Commands::Delete => cmd_delete(&cli, &config),
        Commands::BuildIndex => cmd_build_index(&cli, &config).await,
        Commands::Status => cmd_status(&cli, &config),
        Commands::Kb { action } => match action {
            KbCommand::Build => cmd_kb_build(&config).await,
            KbCommand::Status => cmd_kb_status(&config),
        },
        Commands::Ask { question, chat } => cmd_ask(&cli, &config, question, chat.as_deref()).await,
        Commands::Chat { chat } => cmd_chat(&cli, &config, chat.as_deref()).await,
        Commands::Chats { action } => cmd_chats(&cli, &config, action),
        Commands::Updates { action } => cmd_updates(&config, action),
    }
}

// ============================================================================
// Setup Helpers
// ============================================================================

/// 파이프라인 에러를 단계 정보가 담긴 메시지로 변환
fn staged<T>(result: crate::error::Result<T>, stage: Stage) -> Result<T> {
    result.map_err(|e: DocQaError| anyhow::anyhow!(e.user_message(stage)))
}

fn credentials(config: &Config) -> FileCredentialStore {
    FileCredentialStore::in_data_dir(&config.data_dir)
}

/// --user / --password 확인
fn authenticate(cli: &Cli, config: &Config) -> Result<String> {
    let (Some(user), Some(password)) = (&cli.user, &cli.password) else {
        bail!("--user 와 --password 를 지정해야 합니다");
    };

    let verified = credentials(config)
        .verify(user, password)
        .context("사용자 정보 확인 실패")?;
    if !verified {
        bail!("사용자 이름 또는 비밀번호가 올바르지 않습니다");
    }
    Ok(user.clone())
}

fn require_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    create_embedder(config).map_err(|e| {
        anyhow::anyhow!(
            "임베딩 프로바이더를 만들 수 없습니다: {}\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는 오프라인 모드: export DOCQA_EMBEDDER=hash",
            e
        )
    })
}

fn open_workspace(config: &Config) -> Result<(Arc<Workspace>, Arc<dyn EmbeddingProvider>)> {
    let embedder = require_embedder(config)?;
    let workspace = staged(Workspace::new(&config.data_dir, embedder.clone()), Stage::Build)?;
    Ok((Arc::new(workspace), embedder))
}

fn open_session(config: &Config, user: &str) -> Result<SessionContext> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let (workspace, embedder) = open_workspace(config)?;
    let model = create_chat_model(config).context("언어 모델 초기화 실패")?;
    let selector = Arc::new(AgentSelector::new(embedder, model));
    let conversations = Arc::new(FileConversationStore::new(workspace.users_root()));

    Ok(SessionContext::new(user, workspace, selector, conversations))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 사용자 등록 명령어 (register)
fn cmd_register(cli: &Cli, config: &Config) -> Result<()> {
    let (Some(user), Some(password)) = (&cli.user, &cli.password) else {
        bail!("--user 와 --password 를 지정해야 합니다");
    };

    let created = credentials(config)
        .register(user, password)
        .context("사용자 등록 실패")?;

    if created {
        std::fs::create_dir_all(config.data_dir.join("user_data").join(user).join("chats"))
            .context("사용자 디렉토리 생성 실패")?;
        println!("[OK] 사용자 '{}' 등록됨", user);
    } else {
        println!("[!] 이미 존재하는 사용자입니다: {}", user);
    }
    Ok(())
}

/// 업로드/교체 명령어 (upload, replace)
async fn cmd_upload(cli: &Cli, config: &Config, input: &str, replace: bool) -> Result<()> {
    let user = authenticate(cli, config)?;
    let (workspace, _) = open_workspace(config)?;

    println!("[*] 처리 중: {}", input);
    let summary = if replace {
        staged(workspace.replace(&user, input).await, Stage::Upload)?
    } else {
        staged(workspace.upload(&user, input).await, Stage::Upload)?
    };

    print_build_summary(&summary);
    Ok(())
}

/// 삭제 명령어 (delete)
fn cmd_delete(cli: &Cli, config: &Config) -> Result<()> {
    let user = authenticate(cli, config)?;
    let (workspace, _) = open_workspace(config)?;

    if staged(workspace.delete(&user), Stage::Delete)? {
        println!("[OK] 문서와 인덱스가 삭제되었습니다");
    } else {
        println!("[!] 삭제할 문서가 없습니다");
    }
    Ok(())
}

/// 인덱스 재빌드 명령어 (build-index)
async fn cmd_build_index(cli: &Cli, config: &Config) -> Result<()> {
    let user = authenticate(cli, config)?;
    let (workspace, _) = open_workspace(config)?;

    let summary = staged(workspace.build_index(&user).await, Stage::Build)?;
    print_build_summary(&summary);
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(cli: &Cli, config: &Config) -> Result<()> {
    let user = authenticate(cli, config)?;
    let (workspace, _) = open_workspace(config)?;

    println!("docqa v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    let status = staged(workspace.status(&user), Stage::Upload)?;
    match status.state() {
        DocumentState::Empty => println!("[!] 업로드된 문서가 없습니다"),
        DocumentState::Unindexed(doc) => {
            println!("[!] 문서: {} (인덱스 없음, build-index 로 다시 빌드하세요)", doc.display_name());
        }
        DocumentState::Indexed(doc) => println!("[OK] 문서: {}", doc.display_name()),
    }
    print_index_status("사용자 인덱스", &status.index);

    let global = workspace.global_status();
    print_index_status("공용 지식 베이스", &global.index);
    Ok(())
}

/// 공용 지식 베이스 빌드 명령어 (kb build)
async fn cmd_kb_build(config: &Config) -> Result<()> {
    let (workspace, _) = open_workspace(config)?;
    println!("[*] 공용 문서 폴더: {}", workspace.preloaded_dir().display());

    let summary = staged(workspace.build_global().await, Stage::Build)?;
    print_build_summary(&summary);
    Ok(())
}

/// 공용 지식 베이스 상태 명령어 (kb status)
fn cmd_kb_status(config: &Config) -> Result<()> {
    let (workspace, _) = open_workspace(config)?;
    let status = workspace.global_status();

    println!("[*] 공용 문서 ({} 건):", status.documents.len());
    for doc in &status.documents {
        println!("    - {}", doc);
    }
    print_index_status("공용 지식 베이스", &status.index);
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(cli: &Cli, config: &Config, question: &str, chat: Option<&str>) -> Result<()> {
    let user = authenticate(cli, config)?;
    let mut session = open_session(config, &user)?;

    if let Some(id) = chat {
        staged(session.load_conversation(id), Stage::Answer)?;
    }

    let answer = session.ask(question).await;
    print_notices(&session);
    print_answer(&answer);

    if let Some(id) = session.conversation_id() {
        println!("[*] 대화 ID: {}", id);
    }
    Ok(())
}

/// 대화형 명령어 (chat)
async fn cmd_chat(cli: &Cli, config: &Config, chat: Option<&str>) -> Result<()> {
    let user = authenticate(cli, config)?;
    let mut session = open_session(config, &user)?;

    match chat {
        Some(id) => {
            staged(session.load_conversation(id), Stage::Answer)?;
            println!("[OK] 대화 불러옴: {} ({} 턴)", id, session.history().len());
        }
        None => {
            let id = staged(session.new_conversation(), Stage::Answer)?;
            println!("[OK] 새 대화: {}", id);
        }
    }
    println!("    빈 줄 또는 /quit 으로 종료, /new 로 새 대화");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().context("출력 실패")?;

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" | "/quit" | "/exit" => break,
            "/new" => {
                let id = staged(session.new_conversation(), Stage::Answer)?;
                println!("[OK] 새 대화: {}", id);
            }
            question => {
                let answer = session.ask(question).await;
                print_notices(&session);
                print_answer(&answer);
            }
        }
    }

    Ok(())
}

/// 대화 관리 명령어 (chats)
fn cmd_chats(cli: &Cli, config: &Config, action: &ChatsCommand) -> Result<()> {
    let user = authenticate(cli, config)?;
    let store = FileConversationStore::new(config.data_dir.join("user_data"));

    match action {
        ChatsCommand::List => {
            let chats = staged(store.list(&user), Stage::Answer)?;
            if chats.is_empty() {
                println!("[!] 저장된 대화가 없습니다.");
                return Ok(());
            }
            println!("[OK] 저장된 대화 ({} 건):\n", chats.len());
            for chat in chats {
                println!("  {}  {}", chat.id, truncate_text(&chat.title, 60));
            }
        }
        ChatsCommand::Show { id } => {
            let turns = staged(store.load(&user, id), Stage::Answer)?;
            if turns.is_empty() {
                println!("[!] 대화를 찾을 수 없거나 비어 있습니다: {}", id);
                return Ok(());
            }
            for turn in turns {
                let speaker = match turn.role {
                    Role::Human => "나",
                    Role::Ai => "AI",
                };
                println!("[{}] {}\n", speaker, turn.content);
            }
        }
        ChatsCommand::Delete { id } => {
            staged(store.delete(&user, id), Stage::Delete)?;
            println!("[OK] 대화 {} 삭제됨", id);
        }
    }
    Ok(())
}

/// 업데이트 열람 명령어 (updates)
fn cmd_updates(config: &Config, action: &UpdatesCommand) -> Result<()> {
    let reader = DirUpdatesReader::new(config.data_dir.join("scraped_data"));

    match action {
        UpdatesCommand::List { tag: None } => {
            let tags = staged(reader.tags(), Stage::Retrieve)?;
            if tags.is_empty() {
                println!("[!] 수집된 업데이트가 없습니다.");
            }
            for tag in tags {
                println!("  {} ({})", tag, reader.display_name(&tag));
            }
        }
        UpdatesCommand::List { tag: Some(tag) } => {
            let files = staged(reader.list_files(tag), Stage::Retrieve)?;
            if files.is_empty() {
                println!("[!] {} 에 파일이 없습니다.", reader.display_name(tag));
                return Ok(());
            }
            println!("[OK] {} ({} 건):\n", reader.display_name(tag), files.len());
            for file in files {
                println!("  {}", file);
            }
        }
        UpdatesCommand::Read { tag, file } => {
            let content = staged(reader.read(tag, file), Stage::Retrieve)?;
            println!("{}", content);
        }
    }
    Ok(())
}

// ============================================================================
// Output Helpers
// ============================================================================

fn print_build_summary(summary: &BuildSummary) {
    println!(
        "[OK] 인덱스 완료: {} 청크 (차원 {})",
        summary.chunk_count, summary.dimension
    );
    println!("     위치: {}", summary.path.display());
}

fn print_index_status(label: &str, status: &IndexStatus) {
    match status {
        IndexStatus::Missing => println!("[!] {}: 없음", label),
        IndexStatus::Incomplete { found } => {
            println!(
                "[!] {}: 불완전 (발견된 파일: [{}]), 다시 빌드하세요",
                label,
                found.join(", ")
            );
        }
        IndexStatus::Ready {
            vector_bytes,
            chunk_bytes,
            created_at,
        } => {
            let created = created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[OK] {}: 준비됨 (벡터 {}, 청크 {}, 생성 {})",
                label,
                format_bytes(*vector_bytes),
                format_bytes(*chunk_bytes),
                created
            );
        }
    }
}

fn print_notices(session: &SessionContext) {
    if let Some(agent) = session.agent() {
        for notice in agent.notices() {
            println!("[!] {}", notice);
        }
    }
}

fn print_answer(answer: &Answer) {
    match answer {
        Answer::Grounded { text, sources } => {
            println!("\n{}\n", text);
            if !sources.is_empty() {
                println!("[*] 출처:");
                for source in sources {
                    println!("    - {}", source);
                }
            }
        }
        Answer::Ungrounded { text, reason } => {
            println!("\n{}\n", text);
            println!("[!] 문서 근거 없는 답변 ({})", reason);
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
