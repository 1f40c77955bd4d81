//! Text Chunking - 단어 윈도우 분할
//!
//! 엔티티 문서는 짧지만 설명이 긴 경우를 위해
//! 고정 단어 수 + 오버랩으로 나눕니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 당 단어 수
    pub chunk_words: usize,
    /// 청크 간 중첩 단어 수 (chunk_words보다 작아야 함)
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_words: 200,
            overlap_words: 20,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// 단어 윈도우 청커
#[derive(Debug, Clone, Default)]
pub struct WordChunker {
    config: ChunkConfig,
}

impl WordChunker {
    pub fn new(config: ChunkConfig) -> Self {
        let overlap_words = config
            .overlap_words
            .min(config.chunk_words.saturating_sub(1));
        Self {
            config: ChunkConfig {
                chunk_words: config.chunk_words.max(1),
                overlap_words,
            },
        }
    }
}

impl Chunker for WordChunker {
    /// 줄바꿈은 짧은 문서에서 그대로 유지하고,
    /// 윈도우로 나눌 때만 공백으로 합칩니다.
    fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();

        if words.is_empty() {
            return vec![];
        }

        if words.len() <= self.config.chunk_words {
            return vec![text.trim().to_string()];
        }

        let step = self.config.chunk_words - self.config.overlap_words;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.config.chunk_words).min(words.len());
            chunks.push(words[start..end].join(" "));

            if end >= words.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WordChunker::default())
}
