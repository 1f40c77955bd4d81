//! HTTP 핸들러
//!
//! - 페이지 핸들러: 폼 제출 결과를 대시보드 HTML로 응답
//! - `/api/*` 핸들러: JSON 응답, 실패 시 `ApiError`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::Utc;
use serde::Deserialize;

use super::error::ApiError;
use super::page::PageState;
use super::state::AppState;
use crate::error::VaultError;
use crate::models::{
    AnswerResponse, ApiMessage, Entity, EntityDraft, FolderWithEntities, QueryResponse,
    VaultExport,
};

// ============================================================================
// Request Types
// ============================================================================

/// 엔티티 생성 폼
#[derive(Debug, Deserialize)]
pub struct EntityForm {
    pub title: String,
    pub description: String,
    pub data_type: String,
    pub data: String,
    pub folder_name: String,
}

impl EntityForm {
    fn into_draft(self) -> Result<EntityDraft, VaultError> {
        Ok(EntityDraft {
            title: self.title,
            description: self.description,
            data_type: self.data_type.parse()?,
            data: self.data,
            folder_name: self.folder_name,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryForm {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub question: String,
    pub k: Option<usize>,
}

// ============================================================================
// Page Handlers
// ============================================================================

pub async fn health() -> Json<ApiMessage> {
    Json(ApiMessage::new("ok"))
}

pub async fn home(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let page = PageState::load(&state.service).await?;
    Ok(Html(page.render()?))
}

/// 폼으로 엔티티 생성 → 성공 시 `/`로 303
pub async fn create_entity_form(
    State(state): State<AppState>,
    Form(form): Form<EntityForm>,
) -> Result<Response, ApiError> {
    let result = match form.into_draft() {
        Ok(draft) => state.service.create_entity(&draft).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(e) => {
            tracing::warn!("Form entity creation failed: {}", e);
            render_page(
                StatusCode::BAD_REQUEST,
                PageState::load(&state.service)
                    .await?
                    .with_error(format!("Failed to save entity: {}", e)),
            )
        }
    }
}

pub async fn query_form(
    State(state): State<AppState>,
    Form(form): Form<QueryForm>,
) -> Result<Response, ApiError> {
    match state.service.search_entities(&form.question, None).await {
        Ok(matches) => {
            let page = PageState::load(&state.service)
                .await?
                .with_query_result(QueryResponse {
                    question: form.question,
                    matches,
                });
            render_page(StatusCode::OK, page)
        }
        Err(e) => render_page(
            StatusCode::BAD_REQUEST,
            PageState::load(&state.service)
                .await?
                .with_error(format!("Query failed: {}", e)),
        ),
    }
}

/// vault 전체를 JSON 파일로 다운로드
pub async fn download_export(State(state): State<AppState>) -> Result<Response, ApiError> {
    let payload = state.service.export_vault().await?;
    let body = serde_json::to_string_pretty(&payload).map_err(VaultError::from)?;
    let filename = format!("vault-export-{}.json", Utc::now().format("%Y%m%d%H%M%S"));

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// multipart `file` 필드의 내보내기 JSON으로 전체 교체
pub async fn import_form(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let payload = match read_import_file(multipart).await {
        Ok(payload) => payload,
        Err(message) => {
            tracing::warn!("Rejected import file: {}", message);
            return render_page(
                StatusCode::BAD_REQUEST,
                PageState::load(&state.service)
                    .await?
                    .with_error(format!("Invalid import file: {}", message)),
            );
        }
    };

    if let Err(e) = state.service.import_vault(&payload).await {
        return render_page(
            StatusCode::BAD_REQUEST,
            PageState::load(&state.service)
                .await?
                .with_error(format!("Import failed: {}", e)),
        );
    }

    render_page(
        StatusCode::OK,
        PageState::load(&state.service)
            .await?
            .with_success("Vault imported successfully."),
    )
}

async fn read_import_file(mut multipart: Multipart) -> Result<VaultExport, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field.bytes().await.map_err(|e| e.body_text())?;
        let payload: VaultExport = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        payload.validate().map_err(|e| e.to_string())?;
        return Ok(payload);
    }
    Err("missing file field".to_string())
}

fn render_page(status: StatusCode, page: PageState) -> Result<Response, ApiError> {
    Ok((status, Html(page.render()?)).into_response())
}

// ============================================================================
// JSON API Handlers
// ============================================================================

pub async fn list_entities(State(state): State<AppState>) -> Result<Json<Vec<Entity>>, ApiError> {
    Ok(Json(state.service.list_entities().await?))
}

pub async fn create_entity(
    State(state): State<AppState>,
    payload: Result<Json<EntityDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Entity>), ApiError> {
    let Json(draft) = payload?;
    let entity = state.service.create_entity(&draft).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn get_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<Entity>, ApiError> {
    Ok(Json(state.service.get_entity(&entity_id).await?))
}

pub async fn update_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    payload: Result<Json<EntityDraft>, JsonRejection>,
) -> Result<Json<Entity>, ApiError> {
    let Json(draft) = payload?;
    Ok(Json(state.service.update_entity(&entity_id, &draft).await?))
}

pub async fn delete_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    state.service.delete_entity(&entity_id).await?;
    Ok(Json(ApiMessage::new("Entity deleted")))
}

pub async fn list_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<FolderWithEntities>>, ApiError> {
    Ok(Json(state.service.list_folders().await?))
}

pub async fn delete_folder(
    State(state): State<AppState>,
    Path(folder_id): Path<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    state.service.delete_folder(&folder_id).await?;
    Ok(Json(ApiMessage::new("Folder deleted")))
}

pub async fn query_api(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Query(params) = params?;
    let matches = state
        .service
        .search_entities(&params.question, params.k)
        .await?;
    Ok(Json(QueryResponse {
        question: params.question,
        matches,
    }))
}

pub async fn ask_api(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Query(params) = params?;
    Ok(Json(state.service.query(&params.question, params.k).await?))
}

pub async fn export_api(State(state): State<AppState>) -> Result<Json<VaultExport>, ApiError> {
    Ok(Json(state.service.export_vault().await?))
}

pub async fn import_api(
    State(state): State<AppState>,
    payload: Result<Json<VaultExport>, JsonRejection>,
) -> Result<Json<ApiMessage>, ApiError> {
    let Json(payload) = payload?;
    state.service.import_vault(&payload).await?;
    Ok(Json(ApiMessage::new("Import completed")))
}
