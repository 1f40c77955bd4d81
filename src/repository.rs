//! Entity Repository - JSON 파일 기반 vault 저장소
//!
//! 폴더와 엔티티를 하나의 JSON 문서로 저장합니다.
//! 저장 위치: <data_dir>/entities.json
//!
//! ```json
//! { "folders": [ { "id": "...", "name": "Work", "created_at": "...", "entities": [ ... ] } ] }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::models::{
    new_id, DataType, Entity, EntityDraft, FolderWithEntities, VaultExport,
};

/// 레거시 목록 형식 마이그레이션 시 사용하는 폴더 이름
pub const DEFAULT_FOLDER_NAME: &str = "General";

// ============================================================================
// On-disk Layout
// ============================================================================

/// 디스크에 저장되는 최상위 문서
#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultFile {
    folders: Vec<StoredFolder>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredFolder {
    #[serde(default = "new_id")]
    id: String,
    name: String,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    entities: Vec<StoredEntity>,
}

/// 저장된 엔티티 (구버전 파일은 폴더 정보가 없을 수 있음)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntity {
    #[serde(default = "new_id")]
    id: String,
    title: String,
    description: String,
    data_type: DataType,
    data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl StoredFolder {
    fn new(name: &str) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            created_at: Utc::now(),
            entities: Vec::new(),
        }
    }

    fn hydrate(&self) -> FolderWithEntities {
        FolderWithEntities {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            entities: self.entities.iter().map(|e| e.hydrate(self)).collect(),
        }
    }
}

impl StoredEntity {
    /// 누락된 폴더 정보를 소속 폴더 값으로 채움
    fn hydrate(&self, folder: &StoredFolder) -> Entity {
        Entity {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            data_type: self.data_type,
            data: self.data.clone(),
            folder_name: self.folder_name.clone().unwrap_or_else(|| folder.name.clone()),
            folder_id: self.folder_id.clone().unwrap_or_else(|| folder.id.clone()),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }

    fn from_entity(entity: &Entity, folder_id: &str, folder_name: &str) -> Self {
        Self {
            id: entity.id.clone(),
            title: entity.title.clone(),
            description: entity.description.clone(),
            data_type: entity.data_type,
            data: entity.data.clone(),
            folder_name: Some(folder_name.to_string()),
            folder_id: Some(folder_id.to_string()),
            created_at: Some(entity.created_at),
        }
    }
}

// ============================================================================
// EntityRepository
// ============================================================================

/// JSON 파일 기반 엔티티 저장소
///
/// 모든 연산은 파일 전체를 읽고 쓰며, 내부 Mutex로 직렬화됩니다.
pub struct EntityRepository {
    storage_path: PathBuf,
    lock: Mutex<()>,
}

impl EntityRepository {
    /// 저장소 열기 (없으면 생성)
    ///
    /// 구버전 형식이면 폴더 구조로 마이그레이션한 뒤 저장합니다.
    pub fn open(storage_path: &Path) -> VaultResult<Self> {
        if let Some(parent) = storage_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let repo = Self {
            storage_path: storage_path.to_path_buf(),
            lock: Mutex::new(()),
        };

        {
            let _guard = repo.guard()?;
            if repo.storage_path.exists() {
                let (content, migrated) = repo.read_raw()?;
                if migrated {
                    tracing::info!("Migrated legacy vault file at {:?}", repo.storage_path);
                    repo.write_raw(&content)?;
                }
            } else {
                repo.write_raw(&VaultFile::default())?;
            }
        }

        tracing::debug!("Entity repository opened at {:?}", repo.storage_path);
        Ok(repo)
    }

    /// 저장 파일 경로
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn list_folders(&self) -> VaultResult<Vec<FolderWithEntities>> {
        let _guard = self.guard()?;
        let (content, _) = self.read_raw()?;
        Ok(content.folders.iter().map(StoredFolder::hydrate).collect())
    }

    pub fn list_entities(&self) -> VaultResult<Vec<Entity>> {
        Ok(self
            .list_folders()?
            .into_iter()
            .flat_map(|folder| folder.entities)
            .collect())
    }

    pub fn get_entity(&self, entity_id: &str) -> VaultResult<Option<Entity>> {
        Ok(self
            .list_entities()?
            .into_iter()
            .find(|entity| entity.id == entity_id))
    }

    /// 엔티티 추가 (폴더는 이름으로 찾거나 생성)
    pub fn add_entity(&self, draft: &EntityDraft) -> VaultResult<Entity> {
        let _guard = self.guard()?;
        let (mut content, _) = self.read_raw()?;

        let index = get_or_create_folder(&mut content, &draft.folder_name)?;
        let folder = &mut content.folders[index];

        let entity = Entity {
            id: new_id(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            data_type: draft.data_type,
            data: draft.data.clone(),
            folder_name: folder.name.clone(),
            folder_id: folder.id.clone(),
            created_at: Utc::now(),
        };
        let stored = StoredEntity::from_entity(&entity, &folder.id, &folder.name);
        folder.entities.push(stored);

        self.write_raw(&content)?;
        tracing::info!("Added entity: {} (folder={})", entity.id, entity.folder_name);
        Ok(entity)
    }

    /// 엔티티 수정
    ///
    /// 폴더 이름이 바뀌면 대상 폴더로 이동(끝에 추가)하고,
    /// 같으면 제자리에서 교체합니다. id와 created_at은 유지됩니다.
    pub fn update_entity(&self, entity_id: &str, draft: &EntityDraft) -> VaultResult<Entity> {
        let _guard = self.guard()?;
        let (mut content, _) = self.read_raw()?;

        let (folder_index, entity_index) =
            find_entity(&content, entity_id).ok_or_else(|| VaultError::entity_not_found(entity_id))?;

        let current = &content.folders[folder_index];
        let created_at = current.entities[entity_index]
            .created_at
            .unwrap_or_else(Utc::now);

        let desired = draft.folder_name.trim();
        let moving = !desired.is_empty() && desired.to_lowercase() != current.name.to_lowercase();

        let target_index = if moving {
            let target = get_or_create_folder(&mut content, desired)?;
            content.folders[folder_index].entities.remove(entity_index);
            target
        } else {
            folder_index
        };

        let target = &mut content.folders[target_index];
        let entity = Entity {
            id: entity_id.to_string(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            data_type: draft.data_type,
            data: draft.data.clone(),
            folder_name: target.name.clone(),
            folder_id: target.id.clone(),
            created_at,
        };
        let stored = StoredEntity::from_entity(&entity, &target.id, &target.name);

        if moving {
            target.entities.push(stored);
        } else {
            target.entities[entity_index] = stored;
        }

        self.write_raw(&content)?;
        tracing::info!("Updated entity: {} (folder={})", entity.id, entity.folder_name);
        Ok(entity)
    }

    /// 엔티티 삭제 (모든 폴더에서 제거)
    pub fn delete_entity(&self, entity_id: &str) -> VaultResult<bool> {
        let _guard = self.guard()?;
        let (mut content, _) = self.read_raw()?;

        let mut removed = false;
        for folder in &mut content.folders {
            let before = folder.entities.len();
            folder.entities.retain(|e| e.id != entity_id);
            removed |= folder.entities.len() != before;
        }

        if removed {
            self.write_raw(&content)?;
            tracing::info!("Deleted entity: {}", entity_id);
        }
        Ok(removed)
    }

    /// 빈 폴더 삭제
    pub fn delete_folder(&self, folder_id: &str) -> VaultResult<()> {
        let _guard = self.guard()?;
        let (mut content, _) = self.read_raw()?;

        let index = content
            .folders
            .iter()
            .position(|f| f.id == folder_id)
            .ok_or_else(|| VaultError::folder_not_found(folder_id))?;

        if !content.folders[index].entities.is_empty() {
            return Err(VaultError::Conflict(
                "Folder must be empty before deletion".to_string(),
            ));
        }

        content.folders.remove(index);
        self.write_raw(&content)?;
        tracing::info!("Deleted folder: {}", folder_id);
        Ok(())
    }

    pub fn export_vault(&self) -> VaultResult<VaultExport> {
        Ok(VaultExport::new(self.list_folders()?))
    }

    pub fn import_vault(&self, payload: &VaultExport) -> VaultResult<()> {
        self.replace_all(&payload.folders)
    }

    /// 전체 교체 (엔티티의 폴더 정보는 소속 폴더 기준으로 재작성)
    pub fn replace_all(&self, folders: &[FolderWithEntities]) -> VaultResult<()> {
        let _guard = self.guard()?;

        let content = VaultFile {
            folders: folders
                .iter()
                .map(|folder| StoredFolder {
                    id: folder.id.clone(),
                    name: folder.name.clone(),
                    created_at: folder.created_at,
                    entities: folder
                        .entities
                        .iter()
                        .map(|e| StoredEntity::from_entity(e, &folder.id, &folder.name))
                        .collect(),
                })
                .collect(),
        };

        self.write_raw(&content)?;
        tracing::info!("Replaced vault with {} folder(s)", content.folders.len());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Raw I/O
    // ------------------------------------------------------------------------

    fn guard(&self) -> VaultResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|e| VaultError::Index(format!("Lock error: {}", e)))
    }

    /// 파일 읽기. 반환값의 bool은 마이그레이션 발생 여부
    fn read_raw(&self) -> VaultResult<(VaultFile, bool)> {
        if !self.storage_path.exists() {
            return Ok((VaultFile::default(), false));
        }

        let text = std::fs::read_to_string(&self.storage_path)?;
        if text.trim().is_empty() {
            return Ok((VaultFile::default(), true));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        if value.is_array() {
            let entities: Vec<StoredEntity> = serde_json::from_value(value)?;
            return Ok((migrate_list_to_folders(entities), true));
        }
        if value.get("folders").is_some() {
            let migrated = has_missing_ids(&value);
            return Ok((serde_json::from_value(value)?, migrated));
        }

        tracing::warn!(
            "Unrecognized vault layout ({}), starting empty",
            json_kind(&value)
        );
        Ok((VaultFile::default(), true))
    }

    /// 임시 파일에 쓴 뒤 rename
    fn write_raw(&self, content: &VaultFile) -> VaultResult<()> {
        let json = serde_json::to_string_pretty(content)?;
        let tmp_path = self.storage_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.storage_path)?;
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 이름으로 폴더 찾기 (대소문자 무시), 없으면 생성. 폴더 인덱스 반환
fn get_or_create_folder(content: &mut VaultFile, folder_name: &str) -> VaultResult<usize> {
    let normalized = folder_name.trim();
    if normalized.is_empty() {
        return Err(VaultError::Validation(
            "Folder name cannot be empty".to_string(),
        ));
    }

    let lowered = normalized.to_lowercase();
    if let Some(index) = content
        .folders
        .iter()
        .position(|f| f.name.to_lowercase() == lowered)
    {
        return Ok(index);
    }

    content.folders.push(StoredFolder::new(normalized));
    tracing::debug!("Created folder: {}", normalized);
    Ok(content.folders.len() - 1)
}

fn find_entity(content: &VaultFile, entity_id: &str) -> Option<(usize, usize)> {
    content.folders.iter().enumerate().find_map(|(fi, folder)| {
        folder
            .entities
            .iter()
            .position(|e| e.id == entity_id)
            .map(|ei| (fi, ei))
    })
}

/// 구버전 엔티티 목록 -> 단일 "General" 폴더
fn migrate_list_to_folders(entities: Vec<StoredEntity>) -> VaultFile {
    let mut folder = StoredFolder::new(DEFAULT_FOLDER_NAME);
    let folder_id = folder.id.clone();
    folder.entities = entities
        .into_iter()
        .map(|mut entity| {
            entity
                .folder_name
                .get_or_insert_with(|| DEFAULT_FOLDER_NAME.to_string());
            entity.folder_id.get_or_insert_with(|| folder_id.clone());
            entity.created_at.get_or_insert_with(Utc::now);
            entity
        })
        .collect();
    VaultFile {
        folders: vec![folder],
    }
}

/// id 없는 폴더/엔티티가 있는지 (읽을 때마다 새 id가 생성되므로 저장 필요)
fn has_missing_ids(value: &serde_json::Value) -> bool {
    let missing = |item: &serde_json::Value| !item.get("id").is_some_and(|id| id.is_string());
    value["folders"].as_array().is_some_and(|folders| {
        folders.iter().any(|folder| {
            missing(folder)
                || folder["entities"]
                    .as_array()
                    .is_some_and(|entities| entities.iter().any(missing))
        })
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object without folders",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, EntityRepository) {
        let dir = TempDir::new().unwrap();
        let repo = EntityRepository::open(&dir.path().join("data").join("entities.json")).unwrap();
        (dir, repo)
    }

    fn draft(title: &str, folder: &str) -> EntityDraft {
        EntityDraft {
            title: title.to_string(),
            description: format!("{} description", title),
            data_type: DataType::Note,
            data: format!("{} data", title),
            folder_name: folder.to_string(),
        }
    }

    #[test]
    fn test_open_creates_empty_file() {
        let (_dir, repo) = create_test_repo();
        assert!(repo.storage_path().exists());

        let raw = std::fs::read_to_string(repo.storage_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["folders"], serde_json::json!([]));
        assert!(repo.list_folders().unwrap().is_empty());
    }

    #[test]
    fn test_add_and_get_entity() {
        let (_dir, repo) = create_test_repo();

        let entity = repo.add_entity(&draft("Wifi", "Home")).unwrap();
        assert_eq!(entity.folder_name, "Home");

        let retrieved = repo.get_entity(&entity.id).unwrap().unwrap();
        assert_eq!(retrieved, entity);
        assert!(repo.get_entity("missing").unwrap().is_none());
    }

    #[test]
    fn test_folder_match_is_case_insensitive_and_trimmed() {
        let (_dir, repo) = create_test_repo();

        let a = repo.add_entity(&draft("A", "Work")).unwrap();
        let b = repo.add_entity(&draft("B", "  work ")).unwrap();

        assert_eq!(a.folder_id, b.folder_id);
        assert_eq!(b.folder_name, "Work");

        let folders = repo.list_folders().unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].entities.len(), 2);
    }

    #[test]
    fn test_add_entity_blank_folder_rejected() {
        let (_dir, repo) = create_test_repo();
        let result = repo.add_entity(&draft("A", "   "));
        assert!(matches!(result, Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_list_entities_in_folder_order() {
        let (_dir, repo) = create_test_repo();

        repo.add_entity(&draft("A", "One")).unwrap();
        repo.add_entity(&draft("B", "Two")).unwrap();
        repo.add_entity(&draft("C", "One")).unwrap();

        let titles: Vec<String> = repo
            .list_entities()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_update_in_place_preserves_position() {
        let (_dir, repo) = create_test_repo();

        let first = repo.add_entity(&draft("First", "Work")).unwrap();
        repo.add_entity(&draft("Second", "Work")).unwrap();

        let mut changed = draft("First v2", "WORK");
        changed.data_type = DataType::Token;
        let updated = repo.update_entity(&first.id, &changed).unwrap();

        assert_eq!(updated.id, first.id);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(updated.folder_name, "Work");
        assert_eq!(updated.data_type, DataType::Token);

        let folders = repo.list_folders().unwrap();
        assert_eq!(folders[0].entities[0].title, "First v2");
        assert_eq!(folders[0].entities[1].title, "Second");
    }

    #[test]
    fn test_update_moves_between_folders() {
        let (_dir, repo) = create_test_repo();

        let entity = repo.add_entity(&draft("Key", "Work")).unwrap();
        let updated = repo.update_entity(&entity.id, &draft("Key", "Personal")).unwrap();

        assert_eq!(updated.folder_name, "Personal");
        assert_ne!(updated.folder_id, entity.folder_id);

        let folders = repo.list_folders().unwrap();
        assert_eq!(folders.len(), 2);
        assert!(folders[0].entities.is_empty());
        assert_eq!(folders[1].entities[0].id, entity.id);
        assert_eq!(folders[1].entities[0].folder_id, folders[1].id);
    }

    #[test]
    fn test_update_missing_entity() {
        let (_dir, repo) = create_test_repo();
        let result = repo.update_entity("nope", &draft("X", "Y"));
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_delete_entity() {
        let (_dir, repo) = create_test_repo();

        let entity = repo.add_entity(&draft("Temp", "Scratch")).unwrap();
        assert!(repo.delete_entity(&entity.id).unwrap());
        assert!(!repo.delete_entity(&entity.id).unwrap());
        assert!(repo.get_entity(&entity.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_folder_requires_empty() {
        let (_dir, repo) = create_test_repo();

        let entity = repo.add_entity(&draft("Temp", "Scratch")).unwrap();
        let result = repo.delete_folder(&entity.folder_id);
        assert!(matches!(result, Err(VaultError::Conflict(_))));

        repo.delete_entity(&entity.id).unwrap();
        repo.delete_folder(&entity.folder_id).unwrap();
        assert!(repo.list_folders().unwrap().is_empty());

        let result = repo.delete_folder(&entity.folder_id);
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_export_import_roundtrip_rewrites_folder_refs() {
        let (_dir, repo) = create_test_repo();
        repo.add_entity(&draft("A", "One")).unwrap();

        let mut export = repo.export_vault().unwrap();
        assert_eq!(export.schema_version, "1.0");

        export.folders[0].name = "Renamed".to_string();
        export.folders[0].entities[0].folder_name = "stale".to_string();
        export.folders[0].entities[0].folder_id = "stale".to_string();
        repo.import_vault(&export).unwrap();

        let entity = &repo.list_entities().unwrap()[0];
        assert_eq!(entity.folder_name, "Renamed");
        assert_eq!(entity.folder_id, export.folders[0].id);
    }

    #[test]
    fn test_migrates_legacy_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(
            &path,
            r#"[{"id":"abc","title":"Old","description":"legacy","data_type":"note","data":"x"}]"#,
        )
        .unwrap();

        let repo = EntityRepository::open(&path).unwrap();
        let folders = repo.list_folders().unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, DEFAULT_FOLDER_NAME);
        assert_eq!(folders[0].entities[0].id, "abc");
        assert_eq!(folders[0].entities[0].folder_id, folders[0].id);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("folders").is_some());
    }

    #[test]
    fn test_migrates_empty_and_unknown_files() {
        let dir = TempDir::new().unwrap();

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "  \n").unwrap();
        let repo = EntityRepository::open(&empty).unwrap();
        assert!(repo.list_folders().unwrap().is_empty());
        assert!(std::fs::read_to_string(&empty).unwrap().contains("folders"));

        let unknown = dir.path().join("unknown.json");
        std::fs::write(&unknown, r#"{"items": []}"#).unwrap();
        let repo = EntityRepository::open(&unknown).unwrap();
        assert!(repo.list_folders().unwrap().is_empty());
    }

    #[test]
    fn test_missing_ids_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(
            &path,
            r#"{"folders":[
                {"name":"Empty"},
                {"name":"Ops","entities":[
                    {"title":"T","description":"D","data_type":"note","data":"x"}
                ]}
            ]}"#,
        )
        .unwrap();

        let repo = EntityRepository::open(&path).unwrap();
        let first = repo.list_folders().unwrap();
        let second = repo.list_folders().unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[1].entities[0].id, second[1].entities[0].id);
        assert_eq!(first[1].entities[0].folder_id, first[1].id);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["folders"][0]["id"], serde_json::json!(first[0].id));

        repo.delete_folder(&first[0].id).unwrap();
        assert_eq!(repo.list_folders().unwrap().len(), 1);
    }

    #[test]
    fn test_hydrates_missing_folder_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(
            &path,
            r#"{"folders":[{"id":"f1","name":"Ops","entities":[
                {"id":"e1","title":"T","description":"D","data_type":"link","data":"https://x"}
            ]}]}"#,
        )
        .unwrap();

        let repo = EntityRepository::open(&path).unwrap();
        let entity = repo.get_entity("e1").unwrap().unwrap();
        assert_eq!(entity.folder_id, "f1");
        assert_eq!(entity.folder_name, "Ops");
    }
}
