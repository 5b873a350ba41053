//! Dashboard web UI: HTML pages, form posts, report downloads and a small JSON API.
//!
//! The workbook is read again on every request; writes go through one lock.

mod api;
mod html;
mod pages;

use crate::adapters::LocalStorage;
use crate::config::AppConfig;
use crate::core::backup::BackupService;
use crate::core::ledger::Ledger;
use crate::core::sheets::parse_inventory;
use crate::core::workbook::Workbook;
use crate::domain::model::{InventorySnapshot, ProductCatalog};
use crate::domain::ports::Storage;
use crate::utils::error::{InventoryError, Result};
use anyhow::Context;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::{Local, NaiveDate};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: AppConfig,
    pub catalog: ProductCatalog,
    pub storage: LocalStorage,
    pub backups: BackupService,
    /// Held for the whole read-modify-write of the workbook.
    pub write_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: LocalStorage) -> Self {
        Self {
            catalog: ProductCatalog::from_config(&config),
            backups: BackupService::new(&config),
            write_lock: Mutex::new(()),
            storage,
            config,
        }
    }

    fn workbook_path(&self) -> String {
        self.config.paths.workbook.to_string_lossy().to_string()
    }

    pub async fn load(&self) -> Result<(InventorySnapshot, Ledger)> {
        let path = self.workbook_path();
        if !self.storage.exists(&path).await {
            return Err(InventoryError::not_found(format!("workbook {}", path)));
        }
        let workbook = Workbook::load(&self.storage, &path).await?;
        let snapshot = parse_inventory(&workbook, &self.config, &self.catalog)?;
        let ledger = Ledger::from_snapshot(&self.catalog, &snapshot, &self.config.thresholds);
        Ok((snapshot, ledger))
    }
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn status_for(error: &InventoryError) -> StatusCode {
    match error {
        InventoryError::NotFoundError { .. } => StatusCode::NOT_FOUND,
        InventoryError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InventoryError::MissingSheetError { .. }
        | InventoryError::WorkbookError { .. }
        | InventoryError::WorkbookReadError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::dashboard))
        .route("/entry", get(pages::entry_forms))
        .route("/entry/{kind}", axum::routing::post(pages::submit_entry))
        .route("/reports", get(pages::reports))
        .route("/reports/{kind}/{format}", get(pages::download_report))
        .route("/backups", get(pages::backups).post(pages::create_backup))
        .route("/api/health", get(api::health))
        .route("/api/kpis", get(api::kpis))
        .route("/api/stock", get(api::stock))
        .route("/api/alerts", get(api::alerts))
        .route("/api/sales", get(api::sales))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl+C or SIGTERM.
pub async fn serve(config: AppConfig, storage: LocalStorage) -> anyhow::Result<()> {
    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid [server] host/port")?;
    let state = Arc::new(AppState::new(config, storage));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("🌐 Dashboard running on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
