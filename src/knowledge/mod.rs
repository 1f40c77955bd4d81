//! Knowledge 모듈 - 엔티티 검색 인덱스
//!
//! - Keyword: SQLite FTS5 키워드 검색 (BM25)
//! - LanceDB: 벡터 검색 (ANN)
//! - Hybrid: RRF 알고리즘으로 두 검색 결과 통합
//! - Chunker: 단어 윈도우 텍스트 분할

mod chunker;
mod hybrid;
mod keyword;
mod lance;
mod vector;

// Re-exports
pub use chunker::{default_chunker, ChunkConfig, Chunker, WordChunker};
pub use hybrid::{HybridRetriever, HybridStats, RetrievedDocument, SearchMethod};
pub use keyword::{query_terms, KeywordHit, KeywordIndex};
pub use lance::LanceVectorStore;
pub use vector::{DocumentMetadata, SearchResult, VectorEntry, VectorStore};
