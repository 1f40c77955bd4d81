//! CLI 모듈
//!
//! vault-find CLI 명령어 정의 및 구현

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::embedding::{create_embedder, has_api_key};
use crate::generation::GeneratorKind;
use crate::knowledge::HybridRetriever;
use crate::models::{FolderWithEntities, VaultExport};
use crate::repository::EntityRepository;
use crate::server;
use crate::service::EntityService;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "vault-find")]
#[command(version, about = "폴더 기반 비밀 보관함 + 하이브리드 RAG 검색", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 웹 대시보드 + JSON API 서버 실행
    Serve {
        /// 바인드 주소
        #[arg(short, long, env = "VAULT_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },

    /// 저장된 엔티티 목록
    List {
        /// 폴더 이름 필터 (대소문자 무시)
        #[arg(short, long)]
        folder: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// 자연어 검색
    Search {
        question: String,

        /// 결과 개수 (기본: --search-k)
        #[arg(short)]
        k: Option<usize>,
    },

    /// 검색 결과 기반 답변 생성 (--generator gemini 필요)
    Ask {
        question: String,

        #[arg(short)]
        k: Option<usize>,
    },

    /// vault를 JSON으로 내보내기
    Export {
        /// 출력 파일 (없으면 stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 내보내기 JSON으로 전체 교체
    Import {
        file: PathBuf,
    },

    /// 검색 인덱스 재구축
    Reindex,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config;
    match cli.command {
        Commands::Serve { bind } => server::serve(&config, bind).await,
        Commands::List { folder, limit } => cmd_list(&config, folder, limit).await,
        Commands::Search { question, k } => cmd_search(&config, &question, k).await,
        Commands::Ask { question, k } => cmd_ask(&config, &question, k).await,
        Commands::Export { output } => cmd_export(&config, output).await,
        Commands::Import { file } => cmd_import(&config, &file).await,
        Commands::Reindex => cmd_reindex(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn open_service(config: &AppConfig) -> Result<EntityService> {
    EntityService::open(config)
        .await
        .context("Failed to open vault")
}

/// 저장소만 읽는 명령용 (검색 인덱스와 임베딩은 열지 않음)
fn open_repository(config: &AppConfig) -> Result<EntityRepository> {
    EntityRepository::open(&config.entities_path()).context("Failed to open vault")
}

async fn cmd_list(config: &AppConfig, folder: Option<String>, limit: usize) -> Result<()> {
    let folders = open_repository(config)?.list_folders()?;

    let filter = folder.as_deref().map(|f| f.trim().to_lowercase());
    let folders: Vec<_> = folders
        .into_iter()
        .filter(|f| {
            filter
                .as_deref()
                .map_or(true, |name| f.name.trim().to_lowercase() == name)
        })
        .collect();

    if folders.iter().all(|f| f.entities.is_empty()) {
        println!("[!] 저장된 엔티티가 없습니다.");
        return Ok(());
    }

    print!("{}", format_listing(&folders, limit));
    Ok(())
}

async fn cmd_search(config: &AppConfig, question: &str, k: Option<usize>) -> Result<()> {
    let service = open_service(config).await?;
    service.bootstrap_index().await?;

    println!("[*] 검색 중: \"{}\"", question);
    let matches = service.search_entities(question, k).await?;

    if matches.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", matches.len());
    for (i, m) in matches.iter().enumerate() {
        println!("{}. {} [{}]", i + 1, m.title, m.data_type);
        println!("   폴더: {}", m.folder_name);
        println!("   ID: {}", m.entity_id);
        println!();
    }

    Ok(())
}

async fn cmd_ask(config: &AppConfig, question: &str, k: Option<usize>) -> Result<()> {
    let service = open_service(config).await?;
    service.bootstrap_index().await?;

    println!("[*] 답변 생성 중: \"{}\"", question);
    let response = service.query(question, k).await?;

    println!("\n{}\n", response.answer);
    if !response.matches.is_empty() {
        println!("[*] 참고한 엔티티:");
        for m in &response.matches {
            println!("  - {} ({})", m.title, m.folder_name);
        }
    }

    Ok(())
}

async fn cmd_export(config: &AppConfig, output: Option<PathBuf>) -> Result<()> {
    let payload = open_repository(config)?.export_vault()?;
    let json = serde_json::to_string_pretty(&payload)?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &json)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!(
                "[OK] {} 폴더를 내보냈습니다: {} ({})",
                payload.folders.len(),
                path.display(),
                format_bytes(json.len())
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn cmd_import(config: &AppConfig, file: &Path) -> Result<()> {
    let raw = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let payload: VaultExport =
        serde_json::from_slice(&raw).context("Invalid import file")?;

    let service = open_service(config).await?;
    let indexed = service.import_vault(&payload).await?;

    println!(
        "[OK] {} 폴더, {} 엔티티를 가져왔습니다.",
        payload.folders.len(),
        indexed
    );
    Ok(())
}

async fn cmd_reindex(config: &AppConfig) -> Result<()> {
    let service = open_service(config).await?;
    println!("[*] 검색 인덱스 재구축 중...");
    let indexed = service.rebuild_index().await?;
    println!("[OK] {} 엔티티 인덱싱 완료", indexed);
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("vault-find v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = config.data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정 (hashed 임베딩만 사용 가능)");
    }

    let folders = open_repository(config).and_then(|repo| repo.list_folders().map_err(Into::into));
    match folders {
        Ok(folders) => {
            let entity_count: usize = folders.iter().map(|f| f.entities.len()).sum();
            println!("[OK] 폴더: {} 개, 엔티티: {} 건", folders.len(), entity_count);

            if let Ok(meta) = std::fs::metadata(config.entities_path()) {
                println!("     저장소 크기: {}", format_bytes(meta.len() as usize));
            }
        }
        Err(e) => println!("[!] vault 열기 실패: {:#}", e),
    }

    if let Err(e) = print_index_status(config).await {
        println!("[!] 인덱스 통계 조회 실패: {:#}", e);
    }

    println!(
        "[*] 답변 생성: {}",
        if config.generator == GeneratorKind::None { "미사용" } else { "사용" }
    );

    Ok(())
}

/// 인덱스 상태 출력 (manifest가 달라도 인덱스를 비우지 않음)
async fn print_index_status(config: &AppConfig) -> Result<()> {
    let embedder = create_embedder(config.embedder, config.embedding_dim)?;
    let retriever = HybridRetriever::open(&config.index_dir(), embedder).await?;
    let stats = retriever.stats().await?;

    println!(
        "[OK] 검색 인덱스: {} 청크, {} 벡터 ({}, {}d)",
        stats.chunk_count, stats.vector_count, stats.embedder, stats.dimension
    );
    if !stats.fts_enabled {
        println!("[!] FTS5 미지원: LIKE 검색으로 동작 중");
    }
    if stats.chunk_count > 0 && !retriever.manifest_matches().await? {
        println!("[!] 인덱스가 다른 임베딩 설정으로 생성됨: `vault-find reindex` 필요");
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 폴더별 엔티티 목록 (전체 최대 `limit`개)
fn format_listing(folders: &[FolderWithEntities], limit: usize) -> String {
    let mut out = String::new();
    let mut shown = 0;
    for folder in folders {
        if shown >= limit {
            break;
        }
        out.push_str(&format!("[{}] ({} 건)\n", folder.name, folder.entities.len()));
        for entity in folder.entities.iter().take(limit - shown) {
            out.push_str(&format!(
                "  {} [{}] {}\n",
                entity.id.chars().take(8).collect::<String>(),
                entity.data_type,
                truncate_text(&entity.title, 60)
            ));
            out.push_str(&format!("        {}\n", truncate_text(&entity.description, 100)));
            shown += 1;
        }
        out.push('\n');
    }
    out
}

/// 텍스트 자르기 (유니코드 안전)
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
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

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
