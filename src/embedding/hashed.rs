//! 특징 해싱 임베딩
//!
//! 소문자 단어 토큰을 SHA-256으로 해싱해 고정 차원 버킷에 누적합니다.
//! 외부 API 없이 어휘 중첩 기반의 유사도를 제공하며,
//! 해시가 플랫폼/빌드와 무관하게 안정적이라 인덱스를 디스크에 저장해도 됩니다.

use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 최소 차원
const MIN_DIMENSION: usize = 16;

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token regex"))
}

/// SHA-256 특징 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    dimension: usize,
}

impl HashedEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension < MIN_DIMENSION {
            anyhow::bail!(
                "Invalid dimension: {}. Must be at least {}",
                dimension,
                MIN_DIMENSION
            );
        }
        Ok(Self { dimension })
    }

    /// 텍스트 토큰화 (소문자, 2자 이상)
    pub fn tokenize(text: &str) -> Vec<String> {
        token_regex()
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| t.chars().count() >= 2)
            .collect()
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in Self::tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_to_vector(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashed-sha256"
    }
}
