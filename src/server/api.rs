use super::pages::PeriodQuery;
use super::{status_for, today, AppState};
use crate::config::APP_VERSION;
use crate::core::dashboard::{self, Dashboard};
use crate::domain::ports::Storage;
use crate::utils::error::InventoryError;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

pub struct ApiError(InventoryError);

impl From<InventoryError> for ApiError {
    fn from(error: InventoryError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.0.to_string(),
            "category": format!("{:?}", self.0.category()),
            "suggestion": self.0.recovery_suggestion(),
        });
        (status_for(&self.0), Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let workbook = state.config.paths.workbook.to_string_lossy().to_string();
    let body = json!({
        "status": "up",
        "version": APP_VERSION,
        "workbook": workbook,
        "workbook_present": state.storage.exists(&workbook).await,
    });
    (
        [
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
}

async fn load_dashboard(state: &AppState) -> Result<Dashboard, ApiError> {
    let (snapshot, ledger) = state.load().await?;
    Ok(Dashboard::build(&ledger, &snapshot, &state.catalog, &state.config, today()))
}

pub async fn kpis(State(state): State<Arc<AppState>>) -> ApiResult {
    let view = load_dashboard(&state).await?;
    Ok(Json(view.kpis).into_response())
}

pub async fn stock(State(state): State<Arc<AppState>>) -> ApiResult {
    let (_, ledger) = state.load().await?;
    Ok(Json(ledger.items().to_vec()).into_response())
}

pub async fn alerts(State(state): State<Arc<AppState>>) -> ApiResult {
    let (_, ledger) = state.load().await?;
    Ok(Json(dashboard::alerts(&ledger)).into_response())
}

/// Channel split, daily trend and per-SKU totals; `from`/`to` narrow the window.
pub async fn sales(State(state): State<Arc<AppState>>, Query(period): Query<PeriodQuery>) -> ApiResult {
    let (_, ledger) = state.load().await?;
    let range = period.range();
    Ok(Json(json!({
        "range": range,
        "channels": ledger.sales_by_channel(range.as_ref()),
        "daily": ledger.daily_sales(range.as_ref()),
        "by_sku": ledger.sales_by_sku(range.as_ref()),
    }))
    .into_response())
}
