//! 대시보드 페이지 렌더링
//!
//! assets/dashboard.html에 페이지 상태를 JSON으로 주입합니다.
//! 화면 구성은 페이지 스크립트가 이 JSON으로 그립니다.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::VaultResult;
use crate::models::{DataType, Entity, FolderWithEntities, QueryResponse};
use crate::service::EntityService;

const TEMPLATE: &str = include_str!("../../assets/dashboard.html");
const STATE_PLACEHOLDER: &str = "__VAULT_STATE__";

/// 페이지 상태 (dashboard.html의 `#vault-state`로 전달)
#[derive(Debug, Default, Serialize)]
pub struct PageState {
    pub entities: Vec<Entity>,
    pub folders: Vec<FolderWithEntities>,
    pub folder_names: Vec<String>,
    /// 모달에서 쓰는 id → 엔티티
    pub entities_payload: BTreeMap<String, Entity>,
    pub data_types: Vec<&'static str>,
    pub query_result: Option<QueryResponse>,
    pub error_message: Option<String>,
    pub success_message: Option<String>,
    pub has_generator: bool,
}

impl PageState {
    /// 현재 저장소 내용으로 상태 생성
    pub async fn load(service: &EntityService) -> VaultResult<Self> {
        let folders = service.list_folders().await?;
        let entities: Vec<Entity> = folders
            .iter()
            .flat_map(|f| f.entities.iter().cloned())
            .collect();

        Ok(Self {
            folder_names: folders.iter().map(|f| f.name.clone()).collect(),
            entities_payload: entities
                .iter()
                .map(|e| (e.id.clone(), e.clone()))
                .collect(),
            entities,
            folders,
            data_types: DataType::ALL.iter().map(|t| t.as_str()).collect(),
            has_generator: service.has_generator(),
            ..Self::default()
        })
    }

    pub fn with_query_result(mut self, result: QueryResponse) -> Self {
        self.query_result = Some(result);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_success(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    /// HTML 렌더링
    pub fn render(&self) -> VaultResult<String> {
        let json = serde_json::to_string(self)?;
        Ok(TEMPLATE.replace(STATE_PLACEHOLDER, &escape_script_json(&json)))
    }
}

/// `<script>` 안에 넣을 JSON 이스케이프
///
/// `<`, `>`, `&`는 JSON 문자열 안에서만 나타나므로 유니코드 이스케이프로 바꿔도 값이 같습니다.
fn escape_script_json(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_has_placeholder() {
        assert_eq!(TEMPLATE.matches(STATE_PLACEHOLDER).count(), 1);
    }

    #[test]
    fn test_render_escapes_script_breakout() {
        let state = PageState::default().with_error("</script><script>alert(1)</script>");
        let html = state.render().unwrap();

        assert!(!html.contains(STATE_PLACEHOLDER));
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn test_escaped_json_round_trips() {
        let json = serde_json::to_string(&serde_json::json!({"m": "a<b>&c"})).unwrap();
        let escaped = escape_script_json(&json);
        let value: serde_json::Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(value["m"], "a<b>&c");
    }
}
