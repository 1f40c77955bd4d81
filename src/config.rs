//! 애플리케이션 설정
//!
//! CLI 플래그 > 환경변수 > 기본값 순으로 적용됩니다.
//!
//! 데이터 디렉토리 구성:
//! - entities.json : 폴더/엔티티 저장소
//! - index/        : 검색 인덱스 (keywords.db, vectors.lance, manifest.json)

use std::path::PathBuf;

use clap::Args;

use crate::embedding::{EmbedderKind, DEFAULT_DIMENSION};
use crate::generation::GeneratorKind;

/// 기본 검색 결과 수
pub const DEFAULT_SEARCH_K: usize = 4;

/// 기본 데이터 디렉토리 (~/.local/share/.vault-find 등)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vault-find")
}

/// 공통 설정 (모든 서브커맨드에서 사용)
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// 데이터 디렉토리
    #[arg(long, env = "VAULT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// 임베딩 백엔드
    #[arg(long, env = "VAULT_EMBEDDER", value_enum, default_value_t = EmbedderKind::Hashed, global = true)]
    pub embedder: EmbedderKind,

    /// 임베딩 차원 (gemini: 768, 1536, 3072)
    #[arg(long, env = "VAULT_EMBEDDING_DIM", default_value_t = DEFAULT_DIMENSION, global = true)]
    pub embedding_dim: usize,

    /// 기본 검색 결과 수
    #[arg(long, env = "VAULT_SEARCH_K", default_value_t = DEFAULT_SEARCH_K, global = true)]
    pub search_k: usize,

    /// 답변 생성기
    #[arg(long, env = "VAULT_GENERATOR", value_enum, default_value_t = GeneratorKind::None, global = true)]
    pub generator: GeneratorKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            embedder: EmbedderKind::Hashed,
            embedding_dim: DEFAULT_DIMENSION,
            search_k: DEFAULT_SEARCH_K,
            generator: GeneratorKind::None,
        }
    }
}

impl AppConfig {
    /// 지정된 데이터 디렉토리로 생성 (나머지는 기본값)
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn entities_path(&self) -> PathBuf {
        self.data_dir().join("entities.json")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir().join("index")
    }
}
