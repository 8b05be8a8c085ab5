//! docqa 바이너리

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docqa_rag::cli::{self, Cli};

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli::run(cli))
}

/// 로그는 stderr로 보내 stdout의 답변 출력과 섞이지 않게 함 (기본 INFO, `RUST_LOG`로 조정)
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
