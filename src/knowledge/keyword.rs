//! Keyword Index - rusqlite FTS5 기반 키워드 검색
//!
//! 인덱싱된 청크 텍스트를 SQLite에 저장하고 BM25로 검색합니다.
//! 저장 위치: <data_dir>/index/keywords.db
//!
//! FTS5를 사용할 수 없는 SQLite 빌드에서는 LIKE 검색으로 폴백합니다.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, Row};

use super::vector::DocumentMetadata;

// ============================================================================
// Types
// ============================================================================

/// 키워드 검색 결과
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub metadata: DocumentMetadata,
    pub chunk_index: i32,
    /// 청크 전체 텍스트
    pub content: String,
    /// BM25 스코어 (FTS5: 낮을수록 관련도 높음, LIKE 폴백: 일치 토큰 수의 음수)
    pub bm25_score: f64,
}

// ============================================================================
// KeywordIndex
// ============================================================================

pub struct KeywordIndex {
    conn: Mutex<Connection>,
    fts_enabled: bool,
}

impl KeywordIndex {
    /// 인덱스 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create index directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let fts_enabled = Self::initialize(&conn)?;
        tracing::debug!(
            "Keyword index initialized at {:?} (fts5={})",
            path,
            fts_enabled
        );

        Ok(Self {
            conn: Mutex::new(conn),
            fts_enabled,
        })
    }

    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    /// 스키마 초기화. FTS5 사용 가능 여부 반환
    fn initialize(conn: &Connection) -> Result<bool> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                title TEXT NOT NULL,
                folder TEXT NOT NULL,
                data_type TEXT NOT NULL,
                content TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create chunks table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_entity ON chunks(entity_id)",
            [],
        )
        .context("Failed to create entity index")?;

        // source: https://www.sqlite.org/fts5.html
        let fts_result = conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content,
                content=chunks,
                content_rowid=id
            )",
            [],
        );

        if let Err(e) = fts_result {
            tracing::warn!("FTS5 not available, falling back to LIKE search: {}", e);
            return Ok(false);
        }

        conn.execute_batch(
            r#"
            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content) VALUES (new.id, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content)
                VALUES('delete', old.id, old.content);
            END;
            "#,
        )
        .context("Failed to create FTS5 triggers")?;

        Ok(true)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 엔티티 청크 저장
    pub fn insert_chunks(&self, metadata: &DocumentMetadata, chunks: &[String]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        for (i, chunk) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (entity_id, chunk_index, title, folder, data_type, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    metadata.entity_id,
                    i as i64,
                    metadata.title,
                    metadata.folder,
                    metadata.data_type,
                    chunk
                ],
            )
            .context("Failed to insert chunk")?;
        }

        tx.commit().context("Failed to commit chunks")?;
        Ok(chunks.len())
    }

    /// 키워드 검색 (BM25 정렬)
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        if self.fts_enabled {
            self.search_fts(&terms, limit)
        } else {
            self.search_like(&terms, limit)
        }
    }

    /// source: https://www.sqlite.org/fts5.html#the_bm25_function
    fn search_fts(&self, terms: &[String], limit: usize) -> Result<Vec<KeywordHit>> {
        let conn = self.lock()?;
        let match_expr = terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut stmt = conn.prepare(
            r#"
            SELECT
                c.entity_id, c.title, c.folder, c.data_type, c.chunk_index,
                c.content,
                bm25(chunks_fts) AS score
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.rowid
            WHERE chunks_fts MATCH ?1
            ORDER BY score
            LIMIT ?2
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let hits = stmt
            .query_map(params![match_expr, limit], |row| {
                Ok(KeywordHit {
                    metadata: metadata_from_row(row)?,
                    chunk_index: row.get(4)?,
                    content: row.get(5)?,
                    bm25_score: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read FTS5 results")?;

        Ok(hits)
    }

    /// LIKE 폴백: 일치한 토큰 수가 많은 순
    fn search_like(&self, terms: &[String], limit: usize) -> Result<Vec<KeywordHit>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, title, folder, data_type, chunk_index, content, id FROM chunks
             WHERE LOWER(content) LIKE ?1",
        )?;

        let mut scored: HashMap<i64, (usize, KeywordHit)> = HashMap::new();
        for term in terms {
            let pattern = format!("%{}%", term.to_lowercase());
            let rows = stmt.query_map(params![pattern], |row| {
                Ok((
                    row.get::<_, i64>(6)?,
                    KeywordHit {
                        metadata: metadata_from_row(row)?,
                        chunk_index: row.get(4)?,
                        content: row.get(5)?,
                        bm25_score: 0.0,
                    },
                ))
            })?;

            for row in rows {
                let (id, hit) = row?;
                scored.entry(id).or_insert((0, hit)).0 += 1;
            }
        }

        let mut hits: Vec<(usize, KeywordHit)> = scored.into_values().collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(count, mut hit)| {
                hit.bm25_score = -(count as f64);
                hit
            })
            .collect())
    }

    pub fn delete_by_entity(&self, entity_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM chunks WHERE entity_id = ?1", params![entity_id])?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 전체 삭제 (FTS5 인덱스 포함)
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM chunks", [])
            .context("Failed to clear chunks")?;
        if self.fts_enabled {
            conn.execute("INSERT INTO chunks_fts(chunks_fts) VALUES('rebuild')", [])
                .context("Failed to rebuild FTS5 index")?;
        }
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentMetadata> {
    Ok(DocumentMetadata {
        entity_id: row.get(0)?,
        title: row.get(1)?,
        folder: row.get(2)?,
        data_type: row.get(3)?,
    })
}

/// 질의를 검색어 목록으로 변환
///
/// 영숫자와 `_`만 남기고, 중복을 제거합니다.
/// FTS5에서는 각 검색어를 따옴표로 감싸 OR로 결합합니다.
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if word.is_empty() {
            continue;
        }
        let lowered = word.to_lowercase();
        if !terms.contains(&lowered) {
            terms.push(lowered);
        }
    }
    terms
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_index() -> (TempDir, KeywordIndex) {
        let dir = TempDir::new().unwrap();
        let index = KeywordIndex::open(&dir.path().join("keywords.db")).unwrap();
        (dir, index)
    }

    fn meta(id: &str, title: &str) -> DocumentMetadata {
        DocumentMetadata {
            entity_id: id.to_string(),
            title: title.to_string(),
            folder: "Test".to_string(),
            data_type: "note".to_string(),
        }
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(query_terms("hello world"), vec!["hello", "world"]);
        assert!(query_terms("  ").is_empty());
        assert_eq!(query_terms("API-key: api"), vec!["api", "key"]);
        assert_eq!(query_terms("snake_case \"quoted\""), vec!["snake_case", "quoted"]);
    }

    #[test]
    fn test_insert_and_search() {
        let (_dir, index) = create_test_index();

        index
            .insert_chunks(&meta("a", "React"), &["React is a JavaScript library".to_string()])
            .unwrap();
        index
            .insert_chunks(&meta("b", "Vue"), &["Vue is a JavaScript framework".to_string()])
            .unwrap();
        assert_eq!(index.count().unwrap(), 2);

        let hits = index.search("javascript", 10).unwrap();
        assert_eq!(hits.len(), 2);

        let hits = index.search("react", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.entity_id, "a");
        assert_eq!(hits[0].metadata.title, "React");
    }

    #[test]
    fn test_hit_carries_full_chunk() {
        let (_dir, index) = create_test_index();
        let long_chunk = (0..80)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        index
            .insert_chunks(&meta("a", "Long"), &[format!("vault {}", long_chunk)])
            .unwrap();

        let hits = index.search("vault", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, format!("vault {}", long_chunk));
    }

    #[test]
    fn test_search_with_huge_limit() {
        let (_dir, index) = create_test_index();
        index
            .insert_chunks(&meta("a", "A"), &["alpha".to_string()])
            .unwrap();
        index
            .insert_chunks(&meta("b", "B"), &["alpha beta".to_string()])
            .unwrap();

        let hits = index.search("alpha", usize::MAX).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_terms_are_or_joined() {
        let (_dir, index) = create_test_index();
        index
            .insert_chunks(&meta("a", "Slack"), &["Slack webhook".to_string()])
            .unwrap();

        let hits = index.search("webhook nonexistentword", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_special_characters_do_not_error() {
        let (_dir, index) = create_test_index();
        index
            .insert_chunks(&meta("a", "Key"), &["api key".to_string()])
            .unwrap();

        assert!(index.search("\"api\" AND (key* OR -x)", 10).is_ok());
        assert!(index.search(":::", 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let (_dir, index) = create_test_index();
        index
            .insert_chunks(&meta("a", "A"), &["first chunk".to_string(), "second chunk".to_string()])
            .unwrap();
        index
            .insert_chunks(&meta("b", "B"), &["other chunk".to_string()])
            .unwrap();

        assert_eq!(index.delete_by_entity("a").unwrap(), 2);
        assert_eq!(index.search("first", 10).unwrap().len(), 0);
        assert_eq!(index.count().unwrap(), 1);

        index.clear().unwrap();
        assert_eq!(index.count().unwrap(), 0);
        assert!(index.search("chunk", 10).unwrap().is_empty());
    }
}
