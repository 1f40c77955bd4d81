//! 하이브리드 검색 - FTS5 + LanceDB RRF 통합
//!
//! RRF (Reciprocal Rank Fusion) 알고리즘으로
//! 키워드 검색(FTS5)과 벡터 검색(LanceDB)을 엔티티 단위로 통합합니다.
//!
//! ref: https://www.elastic.co/blog/hybrid-search-rrf
//!
//! 인덱스 디렉토리 구성:
//! - keywords.db    : 청크 텍스트 + FTS5
//! - vectors.lance  : 청크 임베딩
//! - manifest.json  : 인덱스를 만든 임베딩 프로바이더와 차원

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;

use super::chunker::{default_chunker, Chunker};
use super::keyword::{KeywordHit, KeywordIndex};
use super::lance::LanceVectorStore;
use super::vector::{DocumentMetadata, SearchResult, VectorEntry, VectorStore};

/// RRF 상수 (높은 순위에 더 많은 가중치)
const RRF_K: f32 = 60.0;

const KEYWORD_DB_FILE: &str = "keywords.db";
const VECTOR_DIR: &str = "vectors.lance";
const MANIFEST_FILE: &str = "manifest.json";

// ============================================================================
// Types
// ============================================================================

/// 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// 벡터 검색에서만 발견
    Vector,
    /// FTS5 키워드 검색에서만 발견
    Fts,
    /// 양쪽 모두에서 발견
    Hybrid,
}

/// 검색된 문서 (엔티티 당 하나)
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub metadata: DocumentMetadata,
    /// 가장 높은 순위의 청크 텍스트 (벡터 결과 우선, 없으면 키워드 청크)
    pub text: String,
    /// RRF 통합 스코어 (높을수록 좋음)
    pub score: f32,
    pub method: SearchMethod,
}

/// 인덱스 manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexManifest {
    embedder: String,
    dimension: usize,
}

/// 하이브리드 인덱스 통계
#[derive(Debug, Clone)]
pub struct HybridStats {
    pub chunk_count: usize,
    pub vector_count: usize,
    pub embedder: String,
    pub dimension: usize,
    pub fts_enabled: bool,
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
pub struct HybridRetriever {
    index_dir: PathBuf,
    keywords: Arc<KeywordIndex>,
    vector: LanceVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl HybridRetriever {
    /// 인덱스 디렉토리 열기
    ///
    /// 기존 인덱스는 건드리지 않습니다. manifest 검사와 초기화는
    /// [`HybridRetriever::sync_manifest`]에서 수행합니다.
    pub async fn open(index_dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        tokio::fs::create_dir_all(index_dir)
            .await
            .context("Failed to create index directory")?;

        let keyword_path = index_dir.join(KEYWORD_DB_FILE);
        let keywords = tokio::task::spawn_blocking(move || KeywordIndex::open(&keyword_path))
            .await
            .context("Keyword index task failed")?
            .context("Failed to open keyword index")?;
        let vector = LanceVectorStore::open(&index_dir.join(VECTOR_DIR), embedder.dimension())
            .await
            .context("Failed to open vector store")?;

        Ok(Self {
            index_dir: index_dir.to_path_buf(),
            keywords: Arc::new(keywords),
            vector,
            embedder,
            chunker: default_chunker(),
        })
    }

    /// rusqlite 호출은 블로킹 스레드에서 실행
    async fn keyword_task<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&KeywordIndex) -> Result<T> + Send + 'static,
    {
        let keywords = Arc::clone(&self.keywords);
        tokio::task::spawn_blocking(move || task(&keywords))
            .await
            .context("Keyword index task failed")?
    }

    fn manifest_path(&self) -> PathBuf {
        self.index_dir.join(MANIFEST_FILE)
    }

    fn current_manifest(&self) -> IndexManifest {
        IndexManifest {
            embedder: self.embedder.name().to_string(),
            dimension: self.embedder.dimension(),
        }
    }

    async fn read_manifest(&self) -> Result<Option<IndexManifest>> {
        match tokio::fs::read_to_string(self.manifest_path()).await {
            Ok(raw) => Ok(serde_json::from_str::<IndexManifest>(&raw).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read index manifest"),
        }
    }

    /// 인덱스가 현재 임베딩 프로바이더/차원으로 만들어졌는지
    pub async fn manifest_matches(&self) -> Result<bool> {
        Ok(self.read_manifest().await? == Some(self.current_manifest()))
    }

    /// manifest가 현재 설정과 다르면 인덱스를 비우고 manifest를 갱신
    ///
    /// # Returns
    /// 인덱스를 비웠으면 `true`
    pub async fn sync_manifest(&self) -> Result<bool> {
        let expected = self.current_manifest();
        let existing = self.read_manifest().await?;

        if existing.as_ref() == Some(&expected) {
            return Ok(false);
        }

        if let Some(previous) = existing {
            tracing::warn!(
                "Index was built with {} ({}d), clearing for {} ({}d)",
                previous.embedder,
                previous.dimension,
                expected.embedder,
                expected.dimension
            );
        }
        self.reset().await?;

        let raw = serde_json::to_string_pretty(&expected)?;
        tokio::fs::write(self.manifest_path(), raw)
            .await
            .context("Failed to write index manifest")?;
        Ok(true)
    }

    /// 문서 추가 (청킹 → 임베딩 → 벡터 + 키워드 인덱스)
    ///
    /// # Returns
    /// 인덱싱된 청크 수
    pub async fn add_document(&self, text: &str, metadata: DocumentMetadata) -> Result<usize> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for entity: {}", metadata.entity_id);
            return Ok(0);
        }

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .context("Failed to embed chunks")?;

        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, embedding))| VectorEntry {
                metadata: metadata.clone(),
                chunk_index: i as i32,
                chunk_text: chunk.clone(),
                embedding,
            })
            .collect();

        self.vector
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;
        let keyword_metadata = metadata.clone();
        let keyword_chunks = chunks.clone();
        self.keyword_task(move |keywords| keywords.insert_chunks(&keyword_metadata, &keyword_chunks))
            .await
            .context("Failed to insert keyword chunks")?;

        tracing::debug!(
            "Indexed entity {} ({} chunks)",
            metadata.entity_id,
            entries.len()
        );
        Ok(entries.len())
    }

    /// 엔티티의 모든 청크 삭제
    pub async fn remove_document(&self, entity_id: &str) -> Result<usize> {
        let removed = self.vector.delete_by_entity(entity_id).await?;
        let entity_id = entity_id.to_string();
        self.keyword_task(move |keywords| keywords.delete_by_entity(&entity_id))
            .await?;
        Ok(removed)
    }

    /// 하이브리드 검색 (RRF 통합)
    ///
    /// 키워드/벡터 각각 `k * 2`개의 후보를 가져와 엔티티 ID 기준으로 통합하고
    /// 상위 `k`개를 반환합니다.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if question.trim().is_empty() || k == 0 {
            return Ok(vec![]);
        }
        let candidates = k.saturating_mul(2);

        let query = question.to_string();
        let keyword_hits = self
            .keyword_task(move |keywords| keywords.search(&query, candidates))
            .await?;

        let query_embedding = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;
        let vector_hits = self.vector.search(&query_embedding, candidates).await?;

        Ok(rrf_merge(&keyword_hits, &vector_hits, k))
    }

    /// 인덱스 전체 삭제
    pub async fn reset(&self) -> Result<()> {
        self.vector.clear().await?;
        self.keyword_task(|keywords| keywords.clear()).await?;
        Ok(())
    }

    /// 인덱싱된 데이터가 있는지
    pub async fn has_index(&self) -> Result<bool> {
        let chunks = self.keyword_task(|keywords| keywords.count()).await?;
        Ok(chunks > 0 || self.vector.count().await? > 0)
    }

    pub async fn stats(&self) -> Result<HybridStats> {
        Ok(HybridStats {
            chunk_count: self.keyword_task(|keywords| keywords.count()).await?,
            vector_count: self.vector.count().await?,
            embedder: self.embedder.name().to_string(),
            dimension: self.embedder.dimension(),
            fts_enabled: self.keywords.fts_enabled(),
        })
    }
}

// ============================================================================
// RRF
// ============================================================================

/// RRF (Reciprocal Rank Fusion)
///
/// RRF Score = sum(1 / (K + rank)), rank는 1부터.
/// 한 엔티티의 여러 청크가 같은 목록에 있으면 가장 높은 순위만 반영합니다.
fn rrf_merge(
    keyword_hits: &[KeywordHit],
    vector_hits: &[SearchResult],
    limit: usize,
) -> Vec<RetrievedDocument> {
    struct Fused<'a> {
        score: f32,
        first_seen: usize,
        keyword: Option<&'a KeywordHit>,
        vector: Option<&'a SearchResult>,
    }

    let mut fused: HashMap<&str, Fused> = HashMap::new();
    let mut order = 0usize;

    let mut rank = 0usize;
    for hit in keyword_hits {
        let key = hit.metadata.entity_id.as_str();
        if fused.get(key).is_some_and(|f| f.keyword.is_some()) {
            continue;
        }
        rank += 1;
        let entry = fused.entry(key).or_insert_with(|| {
            order += 1;
            Fused {
                score: 0.0,
                first_seen: order,
                keyword: None,
                vector: None,
            }
        });
        entry.score += 1.0 / (RRF_K + rank as f32);
        entry.keyword = Some(hit);
    }

    let mut rank = 0usize;
    for hit in vector_hits {
        let key = hit.metadata.entity_id.as_str();
        if fused.get(key).is_some_and(|f| f.vector.is_some()) {
            continue;
        }
        rank += 1;
        let entry = fused.entry(key).or_insert_with(|| {
            order += 1;
            Fused {
                score: 0.0,
                first_seen: order,
                keyword: None,
                vector: None,
            }
        });
        entry.score += 1.0 / (RRF_K + rank as f32);
        entry.vector = Some(hit);
    }

    let mut results: Vec<Fused> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });
    results.truncate(limit);

    results
        .into_iter()
        .filter_map(|f| {
            let (metadata, text) = match (f.vector, f.keyword) {
                (Some(v), _) => (v.metadata.clone(), v.chunk_text.clone()),
                (None, Some(k)) => (k.metadata.clone(), k.content.clone()),
                (None, None) => return None,
            };
            let method = match (f.keyword.is_some(), f.vector.is_some()) {
                (true, true) => SearchMethod::Hybrid,
                (true, false) => SearchMethod::Fts,
                _ => SearchMethod::Vector,
            };
            Some(RetrievedDocument {
                metadata,
                text,
                score: f.score,
                method,
            })
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedding;
    use tempfile::TempDir;

    fn metadata(entity_id: &str) -> DocumentMetadata {
        DocumentMetadata {
            entity_id: entity_id.to_string(),
            title: format!("Title {}", entity_id),
            folder: "General".to_string(),
            data_type: "note".to_string(),
        }
    }

    fn keyword_hit(entity_id: &str) -> KeywordHit {
        KeywordHit {
            metadata: metadata(entity_id),
            chunk_index: 0,
            content: format!("keyword chunk {}", entity_id),
            bm25_score: -1.0,
        }
    }

    fn vector_hit(entity_id: &str) -> SearchResult {
        SearchResult {
            metadata: metadata(entity_id),
            chunk_index: 0,
            chunk_text: format!("chunk {}", entity_id),
            similarity: 0.5,
        }
    }

    async fn open_retriever(dir: &Path, dimension: usize) -> HybridRetriever {
        let retriever = open_untouched(dir, dimension).await;
        retriever.sync_manifest().await.unwrap();
        retriever
    }

    /// manifest 동기화 없이 열기
    async fn open_untouched(dir: &Path, dimension: usize) -> HybridRetriever {
        let embedder = Arc::new(HashedEmbedding::new(dimension).unwrap());
        HybridRetriever::open(dir, embedder).await.unwrap()
    }

    #[test]
    fn test_rrf_rewards_agreement() {
        let keyword = vec![keyword_hit("a"), keyword_hit("b")];
        let vector = vec![vector_hit("b"), vector_hit("c")];

        let merged = rrf_merge(&keyword, &vector, 10);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].metadata.entity_id, "b");
        assert_eq!(merged[0].method, SearchMethod::Hybrid);
        assert_eq!(merged[0].text, "chunk b");
        // 1/61 + 1/62
        assert!((merged[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_keyword_only_uses_full_chunk() {
        let merged = rrf_merge(&[keyword_hit("a")], &[], 10);
        assert_eq!(merged[0].method, SearchMethod::Fts);
        assert_eq!(merged[0].text, "keyword chunk a");
    }

    #[test]
    fn test_rrf_counts_best_chunk_once() {
        let keyword = vec![keyword_hit("a"), keyword_hit("a"), keyword_hit("b")];
        let merged = rrf_merge(&keyword, &[], 10);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].metadata.entity_id, "a");
        assert_eq!(merged[0].method, SearchMethod::Fts);
        assert!((merged[0].score - 1.0 / 61.0).abs() < 1e-6);
        assert!((merged[1].score - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_truncates_to_limit() {
        let vector: Vec<SearchResult> = ["a", "b", "c", "d"].iter().map(|id| vector_hit(id)).collect();
        let merged = rrf_merge(&[], &vector, 2);
        let ids: Vec<&str> = merged.iter().map(|d| d.metadata.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(merged.iter().all(|d| d.method == SearchMethod::Vector));
    }

    #[tokio::test]
    async fn test_add_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let retriever = open_retriever(dir.path(), 64).await;
        assert!(!retriever.has_index().await.unwrap());

        retriever
            .add_document(
                "Title: Production database\nDescription: postgres credentials for billing",
                metadata("db"),
            )
            .await
            .unwrap();
        retriever
            .add_document(
                "Title: Github token\nDescription: personal access token for ci",
                metadata("gh"),
            )
            .await
            .unwrap();
        assert!(retriever.has_index().await.unwrap());

        let results = retriever.retrieve("postgres database", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.entity_id, "db");

        let stats = retriever.stats().await.unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.vector_count, 2);
        assert_eq!(stats.dimension, 64);
    }

    #[tokio::test]
    async fn test_blank_question_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let retriever = open_retriever(dir.path(), 32).await;
        retriever.add_document("Title: x", metadata("x")).await.unwrap();
        assert!(retriever.retrieve("   ", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_reset() {
        let dir = TempDir::new().unwrap();
        let retriever = open_retriever(dir.path(), 32).await;
        retriever.add_document("Title: alpha", metadata("a")).await.unwrap();
        retriever.add_document("Title: beta", metadata("b")).await.unwrap();

        retriever.remove_document("a").await.unwrap();
        let results = retriever.retrieve("alpha", 4).await.unwrap();
        assert!(results.iter().all(|d| d.metadata.entity_id != "a"));

        retriever.reset().await.unwrap();
        assert!(!retriever.has_index().await.unwrap());
    }

    #[tokio::test]
    async fn test_manifest_mismatch_clears_index() {
        let dir = TempDir::new().unwrap();
        {
            let retriever = open_retriever(dir.path(), 32).await;
            retriever.add_document("Title: alpha", metadata("a")).await.unwrap();
            assert!(retriever.has_index().await.unwrap());
        }

        // 같은 설정으로 다시 열면 유지
        {
            let retriever = open_retriever(dir.path(), 32).await;
            assert!(retriever.manifest_matches().await.unwrap());
            assert!(retriever.has_index().await.unwrap());
        }

        // 차원이 바뀌면 비워짐
        let retriever = open_untouched(dir.path(), 48).await;
        assert!(!retriever.manifest_matches().await.unwrap());
        assert!(retriever.sync_manifest().await.unwrap());
        assert!(!retriever.has_index().await.unwrap());
        assert!(retriever.manifest_matches().await.unwrap());

        let raw = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        let manifest: IndexManifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(manifest.dimension, 48);
        assert_eq!(manifest.embedder, "hashed-sha256");
    }

    #[tokio::test]
    async fn test_open_with_other_embedder_keeps_index() {
        let dir = TempDir::new().unwrap();
        {
            let retriever = open_retriever(dir.path(), 32).await;
            retriever.add_document("Title: alpha", metadata("a")).await.unwrap();
        }

        {
            let other = open_untouched(dir.path(), 48).await;
            assert!(!other.manifest_matches().await.unwrap());
            assert_eq!(other.stats().await.unwrap().chunk_count, 1);
        }

        let retriever = open_retriever(dir.path(), 32).await;
        let stats = retriever.stats().await.unwrap();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.vector_count, 1);
    }
}
