mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{config_in, write_workbook};
use small_inventory::server::{router, AppState};
use small_inventory::{AppConfig, LocalStorage};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(config: AppConfig) -> Router {
    router(Arc::new(AppState::new(config, LocalStorage::default())))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_workbook_presence() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let response = app(config.clone())
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CACHE_CONTROL]
        .to_str()
        .unwrap()
        .contains("no-store"));
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "up");
    assert_eq!(json["workbook_present"], false);

    write_workbook(&config, &[]);
    let response = app(config)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["workbook_present"], true);
}

#[tokio::test]
async fn test_dashboard_without_workbook_is_404() {
    let dir = TempDir::new().unwrap();
    let response = app(config_in(dir.path()))
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_entry_kind_is_404() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[]);

    let response = app(config)
        .oneshot(post_form("/entry/transfer", "product=1.0kg"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sale_post_updates_stock_api() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_1.0KG", 40)]);
    let app = app(config);

    let response = app
        .clone()
        .oneshot(post_form(
            "/entry/sale",
            "date=2025-06-02&product=1.0kg&channel=Flipkart&quantity=15&unit_price=100&order_id=",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Sales Entry saved to &#39;Sales_Log&#39;"));

    let response = app
        .oneshot(Request::get("/api/stock").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let items: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    let kilo = items
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["product"]["sku"] == "RC_1.0KG")
        .unwrap();
    assert_eq!(kilo["sales"], 15);
    assert_eq!(kilo["current_stock"], 25);
}

#[tokio::test]
async fn test_invalid_sale_post_is_422() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[]);

    let response = app(config)
        .oneshot(post_form("/entry/sale", "product=1.0kg&channel=Flipkart"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("Date is required"));
}

#[tokio::test]
async fn test_report_download_sets_attachment_headers() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_0.5KG", 12)]);

    let response = app(config)
        .oneshot(
            Request::get("/reports/stock_summary/csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"stock_summary_"));

    let csv = body_text(response).await;
    assert_eq!(csv.lines().count(), 6);
    assert!(csv.lines().any(|l| l.starts_with("RC_0.5KG,")));
}

#[tokio::test]
async fn test_manual_backup_post_lists_backup() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[]);
    let backups_dir = config.paths.backups_dir.clone();

    let response = app(config)
        .oneshot(post_form("/backups", "action=manual&description=before+audit"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("before audit"));

    let files: Vec<_> = std::fs::read_dir(backups_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".xlsx"))
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("manual_backup_"));
}
