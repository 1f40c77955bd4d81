//! 웹 서버 모듈 - axum 대시보드 + JSON API

pub mod error;
pub mod handlers;
pub mod page;
pub mod router;
pub mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;

use crate::config::AppConfig;
use crate::service::EntityService;

/// 서버 실행 (Ctrl+C로 종료)
pub async fn serve(config: &AppConfig, bind: SocketAddr) -> Result<()> {
    let service = EntityService::open(config).await?;
    let indexed = service.bootstrap_index().await?;
    tracing::info!(
        "Vault data at {:?} ({} entities bootstrapped)",
        config.data_dir(),
        indexed
    );

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", addr);

    let app = create_router(AppState::new(service).with_port(addr.port()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
