//! 핸들러 공유 상태

use std::sync::Arc;

use crate::service::EntityService;

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EntityService>,
    /// CORS 허용 origin 계산용 포트
    pub port: u16,
}

impl AppState {
    pub fn new(service: EntityService) -> Self {
        Self {
            service: Arc::new(service),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}
