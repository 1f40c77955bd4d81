//! LanceDB Vector Store
//!
//! 엔티티 청크 임베딩과 메타데이터를 하나의 Arrow 테이블에 저장합니다.
//! 저장 위치: <data_dir>/index/vectors.lance
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;

use super::vector::{DocumentMetadata, SearchResult, VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "entities";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (임베딩 프로바이더와 일치해야 함)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;
        Ok(Self { db, dimension })
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("entity_id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("folder", DataType::Utf8, false),
            Field::new("data_type", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Embedding dimension mismatch for entity {}: expected {}, got {}",
                bad.metadata.entity_id,
                self.dimension,
                bad.embedding.len()
            );
        }

        let column = |f: fn(&VectorEntry) -> &str| -> StringArray {
            StringArray::from(entries.iter().map(f).collect::<Vec<&str>>())
        };

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();
        let embeddings = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension,
            Arc::new(Float32Array::from(embeddings_flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(column(|e| e.metadata.entity_id.as_str())),
                Arc::new(column(|e| e.metadata.title.as_str())),
                Arc::new(column(|e| e.metadata.folder.as_str())),
                Arc::new(column(|e| e.metadata.data_type.as_str())),
                Arc::new(Int32Array::from(
                    entries.iter().map(|e| e.chunk_index).collect::<Vec<i32>>(),
                )),
                Arc::new(column(|e| e.chunk_text.as_str())),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await {
            return Ok(None);
        }
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")?;
        Ok(Some(table))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add vectors to table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };
        if limit == 0 {
            return Ok(vec![]);
        }

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in batches {
            let text_column = |name: &str| -> Result<StringArray> {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
            };

            let entity_ids = text_column("entity_id")?;
            let titles = text_column("title")?;
            let folders = text_column("folder")?;
            let data_types = text_column("data_type")?;
            let chunk_texts = text_column("chunk_text")?;

            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

            // LanceDB가 자동 추가하는 L2 거리
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                results.push(SearchResult {
                    metadata: DocumentMetadata {
                        entity_id: entity_ids.value(i).to_string(),
                        title: titles.value(i).to_string(),
                        folder: folders.value(i).to_string(),
                        data_type: data_types.value(i).to_string(),
                    },
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    similarity: 1.0 / (1.0 + distances.value(i)),
                });
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    async fn delete_by_entity(&self, entity_id: &str) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let filter = format!("entity_id = '{}'", entity_id.replace('\'', "''"));
        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for entity")?;

        table
            .delete(&filter)
            .await
            .context("Failed to delete vectors")?;

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };
        table.count_rows(None).await.context("Failed to count rows")
    }

    async fn clear(&self) -> Result<()> {
        if self.table_exists().await {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop vector table")?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn entry(entity_id: &str, chunk_index: i32, hot: usize) -> VectorEntry {
        let mut embedding = vec![0.0; DIM];
        embedding[hot] = 1.0;
        VectorEntry {
            metadata: DocumentMetadata {
                entity_id: entity_id.to_string(),
                title: format!("Title {}", entity_id),
                folder: "Test".to_string(),
                data_type: "note".to_string(),
            },
            chunk_index,
            chunk_text: format!("chunk {} of {}", chunk_index, entity_id),
            embedding,
        }
    }

    async fn open_store(dir: &TempDir) -> LanceVectorStore {
        LanceVectorStore::open(&dir.path().join("vectors.lance"), DIM)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert_eq!(store.count().await.unwrap(), 0);

        let inserted = store
            .insert_batch(&[entry("a", 0, 0), entry("a", 1, 1)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        store.insert_batch(&[entry("b", 0, 2)]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_search_ranks_nearest_first() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .insert_batch(&[entry("a", 0, 0), entry("b", 0, 1), entry("c", 0, 2)])
            .await
            .unwrap();

        let mut query = vec![0.0; DIM];
        query[1] = 1.0;
        let results = store.search(&query, 2).await.unwrap();

        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].metadata.entity_id, "b");
        assert_eq!(results[0].metadata.title, "Title b");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let mut bad = entry("a", 0, 0);
        bad.embedding.push(0.0);
        assert!(store.insert_batch(&[bad]).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store
            .insert_batch(&[entry("a", 0, 0), entry("a", 1, 1), entry("b", 0, 2)])
            .await
            .unwrap();

        assert_eq!(store.delete_by_entity("a").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&vec![1.0; DIM], 5).await.unwrap().is_empty());
    }
}
