//! Vector Store - 벡터 검색 트레이트
//!
//! 인덱싱된 청크마다 엔티티 메타데이터를 함께 저장해
//! 검색 결과만으로 엔티티를 식별할 수 있게 합니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 인덱싱 문서 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub entity_id: String,
    pub title: String,
    pub folder: String,
    pub data_type: String,
}

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub metadata: DocumentMetadata,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

/// 벡터 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub metadata: DocumentMetadata,
    pub chunk_index: i32,
    pub chunk_text: String,
    /// 유사도 스코어 (높을수록 유사)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// 벡터 저장소 공통 인터페이스
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 유사도 순 검색
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 엔티티의 모든 청크 삭제
    async fn delete_by_entity(&self, entity_id: &str) -> Result<usize>;

    /// 저장된 벡터 개수
    async fn count(&self) -> Result<usize>;

    /// 전체 삭제
    async fn clear(&self) -> Result<()>;
}
