mod common;

use common::{config_in, write_workbook};
use small_inventory::core::backup::{BackupService, BackupType};
use small_inventory::core::diagnostics::Diagnostics;
use small_inventory::core::workbook::Workbook;
use small_inventory::InventoryError;
use tempfile::TempDir;

#[tokio::test]
async fn test_diagnostics_flag_missing_workbook() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let report = Diagnostics::run(&config).await;
    assert!(!report.passed());
    let failed: Vec<&str> = report.failures().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(failed, vec!["Workbook exists"]);
    assert!(config.paths.exports_dir.is_dir());
}

#[tokio::test]
async fn test_diagnostics_pass_on_template_workbook() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_1.0KG", 5)]);

    let report = Diagnostics::run(&config).await;
    assert!(report.passed(), "failures: {:?}", report.failures());
    assert!(report.checks.iter().any(|c| c.name == "Required sheets"));
}

#[tokio::test]
async fn test_restore_brings_back_old_workbook_and_keeps_a_copy() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_0.5KG", 100)]);
    let service = BackupService::new(&config);

    let saved = service.create_manual("before overwrite").await.unwrap();
    assert_eq!(saved.backup_type, Some(BackupType::Manual));
    let original = std::fs::read(&config.paths.workbook).unwrap();

    write_workbook(&config, &[("RC_0.5KG", 1)]);
    assert_ne!(std::fs::read(&config.paths.workbook).unwrap(), original);

    let pre_restore = service.restore(&saved.file_name).await.unwrap().unwrap();
    assert_eq!(pre_restore.backup_type, Some(BackupType::PreRestore));
    assert!(pre_restore.file_name.starts_with("pre_restore_backup_"));

    let restored = Workbook::from_bytes(&std::fs::read(&config.paths.workbook).unwrap()).unwrap();
    let stock = restored.sheet(&config.sheets.stock).unwrap();
    assert_eq!(stock.int(1, "Opening Stock"), Some(100));

    let report = service.verify(&saved.file_name).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.metadata.unwrap().description, "before overwrite");
    assert_eq!(service.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_full_backup_archive_layout() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[]);
    std::fs::create_dir_all(config.paths.data_dir.join("imports")).unwrap();
    std::fs::write(config.paths.data_dir.join("imports/june.csv"), "a,b\n1,2\n").unwrap();
    std::fs::create_dir_all(&config.paths.logs_dir).unwrap();
    std::fs::write(config.paths.logs_dir.join("app.2025-06-01.log"), "started\n").unwrap();

    let service = BackupService::new(&config);
    let info = service.create_full_system().await.unwrap();
    assert!(info.file_name.ends_with(".zip"));

    let path = service.backup_dir().join(&info.file_name);
    let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"data/stock_report.xlsx"));
    assert!(names.contains(&"data/files/imports/june.csv"));
    assert!(names.contains(&"logs/app.2025-06-01.log"));
    assert!(names.contains(&"system_info.json"));
    assert!(!names.iter().any(|n| n.contains("backups/")));

    // The archive restores like a plain copy.
    assert!(service.restore(&info.file_name).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_rejects_paths() {
    let dir = TempDir::new().unwrap();
    let service = BackupService::new(&config_in(dir.path()));

    let err = service.delete("../stock_report.xlsx").await.unwrap_err();
    assert!(matches!(err, InventoryError::ValidationError { .. }));
    let err = service.delete("manual_backup_20250101_000000.xlsx").await.unwrap_err();
    assert!(matches!(err, InventoryError::NotFoundError { .. }));
}
