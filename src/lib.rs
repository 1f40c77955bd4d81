//! vault-find - 폴더 기반 비밀 보관함 + 하이브리드 RAG 검색
//!
//! 엔티티(노트, 링크, 비밀값)를 JSON 파일에 폴더 단위로 저장하고,
//! LanceDB 벡터 검색 + SQLite FTS5 키워드 검색으로 자연어 검색을 제공합니다.
//! 비밀값(`data`)은 인덱싱하지 않습니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod models;
pub mod repository;
pub mod server;
pub mod service;

// Re-exports
pub use config::AppConfig;
pub use embedding::{create_embedder, EmbedderKind, EmbeddingProvider, GeminiEmbedding, HashedEmbedding};
pub use error::{VaultError, VaultResult};
pub use generation::{build_prompt, GeminiGenerator, Generator, GeneratorKind};
pub use knowledge::{HybridRetriever, HybridStats, RetrievedDocument, SearchMethod};
pub use models::{
    AnswerResponse, ApiMessage, DataType, Entity, EntityDraft, FolderWithEntities,
    QueryResponse, SearchMatch, VaultExport,
};
pub use repository::EntityRepository;
pub use server::{create_router, AppState};
pub use service::EntityService;
