//! Vault 데이터 모델
//!
//! 폴더 단위로 묶인 엔티티(노트, 링크, 비밀값)와
//! 검색/내보내기 응답 타입을 정의합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// 제목 최대 길이 (문자 수)
pub const TITLE_MAX_CHARS: usize = 200;
/// 설명 최대 길이 (문자 수)
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
/// 폴더 이름 최대 길이 (문자 수)
pub const FOLDER_NAME_MAX_CHARS: usize = 150;
/// 내보내기 스키마 버전
pub const SCHEMA_VERSION: &str = "1.0";

/// 새 ID 생성 (uuid v4, 하이픈 없는 hex)
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ============================================================================
// DataType
// ============================================================================

/// 엔티티에 저장된 데이터 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Link,
    Note,
    Password,
    ApiKey,
    Token,
    Url,
    SshKey,
    ConnectionString,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Link,
        DataType::Note,
        DataType::Password,
        DataType::ApiKey,
        DataType::Token,
        DataType::Url,
        DataType::SshKey,
        DataType::ConnectionString,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Link => "link",
            DataType::Note => "note",
            DataType::Password => "password",
            DataType::ApiKey => "api_key",
            DataType::Token => "token",
            DataType::Url => "url",
            DataType::SshKey => "ssh_key",
            DataType::ConnectionString => "connection_string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        DataType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| VaultError::Validation(format!("Unknown data_type: {}", s)))
    }
}

// ============================================================================
// Entities
// ============================================================================

/// 엔티티 입력 (생성/수정 공통)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub title: String,
    pub description: String,
    pub data_type: DataType,
    pub data: String,
    pub folder_name: String,
}

impl EntityDraft {
    /// 필드 길이 검증
    pub fn validate(&self) -> VaultResult<()> {
        check_length("title", &self.title, 1, Some(TITLE_MAX_CHARS))?;
        check_length("description", &self.description, 1, Some(DESCRIPTION_MAX_CHARS))?;
        check_length("data", &self.data, 1, None)?;
        check_length("folder_name", &self.folder_name, 1, Some(FOLDER_NAME_MAX_CHARS))?;
        if self.folder_name.trim().is_empty() {
            return Err(VaultError::Validation(
                "Folder name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 저장된 엔티티
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default = "new_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub data_type: DataType,
    pub data: String,
    pub folder_name: String,
    pub folder_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn to_draft(&self) -> EntityDraft {
        EntityDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            data_type: self.data_type,
            data: self.data.clone(),
            folder_name: self.folder_name.clone(),
        }
    }
}

// ============================================================================
// Folders
// ============================================================================

/// 엔티티를 포함한 폴더
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderWithEntities {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

// ============================================================================
// Export / Import
// ============================================================================

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// 전체 vault 내보내기 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultExport {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub folders: Vec<FolderWithEntities>,
}

impl VaultExport {
    pub fn new(folders: Vec<FolderWithEntities>) -> Self {
        Self {
            schema_version: default_schema_version(),
            exported_at: Utc::now(),
            folders,
        }
    }

    /// 가져오기 전 폴더/엔티티 검증
    pub fn validate(&self) -> VaultResult<()> {
        for folder in &self.folders {
            check_length("folder name", &folder.name, 1, Some(FOLDER_NAME_MAX_CHARS))?;
            for entity in &folder.entities {
                entity.to_draft().validate().map_err(|e| {
                    VaultError::Validation(format!("entity {}: {}", entity.id, e))
                })?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Search responses
// ============================================================================

/// 검색 결과 (민감한 data 필드 제외)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub entity_id: String,
    pub title: String,
    pub folder_name: String,
    pub data_type: DataType,
}

impl From<&Entity> for SearchMatch {
    fn from(entity: &Entity) -> Self {
        Self {
            entity_id: entity.id.clone(),
            title: entity.title.clone(),
            folder_name: entity.folder_name.clone(),
            data_type: entity.data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub matches: Vec<SearchMatch>,
}

/// 답변 생성 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub question: String,
    pub answer: String,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub detail: String,
}

impl ApiMessage {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn check_length(field: &str, value: &str, min: usize, max: Option<usize>) -> VaultResult<()> {
    let len = value.chars().count();
    if len < min {
        return Err(VaultError::Validation(format!(
            "{} must be at least {} character(s)",
            field, min
        )));
    }
    if let Some(max) = max {
        if len > max {
            return Err(VaultError::Validation(format!(
                "{} must be at most {} characters",
                field, max
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EntityDraft {
        EntityDraft {
            title: "Router admin".to_string(),
            description: "Home router login".to_string(),
            data_type: DataType::Password,
            data: "hunter2".to_string(),
            folder_name: "Home".to_string(),
        }
    }

    #[test]
    fn test_new_id_is_hex() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_data_type_serde() {
        let json = serde_json::to_string(&DataType::ConnectionString).unwrap();
        assert_eq!(json, "\"connection_string\"");

        let parsed: DataType = serde_json::from_str("\"api_key\"").unwrap();
        assert_eq!(parsed, DataType::ApiKey);

        assert!(serde_json::from_str::<DataType>("\"floppy\"").is_err());
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("Link".parse::<DataType>().unwrap(), DataType::Link);
        assert_eq!(" ssh_key ".parse::<DataType>().unwrap(), DataType::SshKey);
        assert!("unknown".parse::<DataType>().is_err());
    }

    #[test]
    fn test_validate_ok() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn test_validate_lengths() {
        let mut d = draft();
        d.title = String::new();
        assert!(d.validate().is_err());

        let mut d = draft();
        d.title = "x".repeat(TITLE_MAX_CHARS + 1);
        let err = d.validate().unwrap_err();
        assert!(err.to_string().contains("title"));

        let mut d = draft();
        d.description = "y".repeat(DESCRIPTION_MAX_CHARS + 1);
        assert!(d.validate().is_err());

        let mut d = draft();
        d.data = String::new();
        assert!(d.validate().is_err());

        let mut d = draft();
        d.folder_name = "   ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_validate_counts_chars_not_bytes() {
        let mut d = draft();
        d.title = "가".repeat(TITLE_MAX_CHARS);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_export_defaults() {
        let export: VaultExport = serde_json::from_str("{}").unwrap();
        assert_eq!(export.schema_version, "1.0");
        assert!(export.folders.is_empty());

        let export: VaultExport =
            serde_json::from_str(r#"{"folders":[{"name":"Work"}]}"#).unwrap();
        assert_eq!(export.folders[0].name, "Work");
        assert_eq!(export.folders[0].id.len(), 32);
        assert!(export.folders[0].entities.is_empty());
    }

    #[test]
    fn test_search_match_omits_data() {
        let entity = Entity {
            id: new_id(),
            title: "t".to_string(),
            description: "d".to_string(),
            data_type: DataType::Token,
            data: "secret".to_string(),
            folder_name: "f".to_string(),
            folder_id: new_id(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(SearchMatch::from(&entity)).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["data_type"], "token");
    }
}
