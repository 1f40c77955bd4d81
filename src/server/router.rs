use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// 가져오기 파일 최대 크기
const IMPORT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// 라우터 생성
///
/// - 대시보드 페이지 및 폼 엔드포인트 (`/`, `/entities`, `/query`, `/export`, `/import`)
/// - JSON API (`/api/*`)
/// - CORS, 요청 트레이싱
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(state.port);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::home))
        .route("/entities", post(handlers::create_entity_form))
        .route("/query", post(handlers::query_form))
        .route("/export", get(handlers::download_export))
        .route(
            "/import",
            post(handlers::import_form).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
        .route(
            "/api/entities",
            get(handlers::list_entities).post(handlers::create_entity),
        )
        .route(
            "/api/entities/:entity_id",
            get(handlers::get_entity)
                .put(handlers::update_entity)
                .delete(handlers::delete_entity),
        )
        .route("/api/folders", get(handlers::list_folders))
        .route("/api/folders/:folder_id", delete(handlers::delete_folder))
        .route("/api/query", get(handlers::query_api))
        .route("/api/ask", get(handlers::ask_api))
        .route("/api/export", get(handlers::export_api))
        .route(
            "/api/import",
            post(handlers::import_api).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

/// 로컬 대시보드 origin만 허용
fn build_cors_layer(port: u16) -> CorsLayer {
    let origins = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
