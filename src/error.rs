//! 도메인 에러 타입
//!
//! 저장소/서비스 계층의 실패를 구분합니다.
//! HTTP 계층은 이 값을 상태 코드로 변환합니다.

use thiserror::Error;

/// vault 도메인 에러
#[derive(Debug, Error)]
pub enum VaultError {
    /// 입력 값 검증 실패 (필드 길이 등)
    #[error("{0}")]
    Validation(String),

    /// 대상 엔티티/폴더 없음
    #[error("{0}")]
    NotFound(String),

    /// 상태 충돌 (비어있지 않은 폴더 삭제 등)
    #[error("{0}")]
    Conflict(String),

    /// 구성되지 않은 기능 (답변 생성기 없음 등)
    #[error("{0}")]
    Unavailable(String),

    /// 파일 I/O 실패
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화/역직렬화 실패
    #[error("invalid vault data: {0}")]
    Json(#[from] serde_json::Error),

    /// 검색 인덱스(임베딩, LanceDB, FTS5) 실패
    #[error("index error: {0}")]
    Index(String),
}

impl VaultError {
    pub fn entity_not_found(entity_id: &str) -> Self {
        Self::NotFound(format!("Entity {} not found", entity_id))
    }

    pub fn folder_not_found(folder_id: &str) -> Self {
        Self::NotFound(format!("Folder {} not found", folder_id))
    }
}

impl From<anyhow::Error> for VaultError {
    fn from(err: anyhow::Error) -> Self {
        Self::Index(format!("{:#}", err))
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;
