mod common;

use common::{config_in, day, write_workbook};
use small_inventory::core::backup::BackupService;
use small_inventory::core::entries::{Entry, EntryKind, FormFields, Recorder};
use small_inventory::core::ledger::Ledger;
use small_inventory::core::sheets::parse_inventory;
use small_inventory::core::workbook::Workbook;
use small_inventory::domain::model::{ProductCatalog, StockStatus};
use small_inventory::{AppConfig, InventoryError, LocalStorage};
use std::collections::HashMap;
use tempfile::TempDir;

fn form(pairs: &[(&str, &str)]) -> FormFields {
    let fields: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    FormFields::from(fields)
}

async fn ledger_of(config: &AppConfig) -> Ledger {
    let storage = LocalStorage::default();
    let catalog = ProductCatalog::from_config(config);
    let path = config.paths.workbook.to_string_lossy().to_string();
    let workbook = Workbook::load(&storage, &path).await.unwrap();
    let snapshot = parse_inventory(&workbook, config, &catalog).unwrap();
    Ledger::from_snapshot(&catalog, &snapshot, &config.thresholds)
}

#[tokio::test]
async fn test_recorded_entries_flow_into_the_ledger() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.backup.auto_backup = false;
    write_workbook(&config, &[("RC_0.5KG", 100), ("RC_1.0KG", 40)]);

    let storage = LocalStorage::default();
    let catalog = ProductCatalog::from_config(&config);
    let recorder = Recorder::new(&storage, &config, &catalog);

    let entries = [
        (
            EntryKind::Sale,
            form(&[
                ("date", "2025-06-02"),
                ("product", "0.5kg"),
                ("channel", "Amazon FBA"),
                ("quantity", "30"),
                ("unit_price", "55"),
            ]),
        ),
        (
            EntryKind::Purchase,
            form(&[
                ("date", "2025-06-03"),
                ("supplier", "Sharma Traders"),
                ("product", "0.5kg"),
                ("quantity", "20"),
                ("rate", "40"),
            ]),
        ),
        (
            EntryKind::Production,
            form(&[
                ("date", "2025-06-04"),
                ("batch_number", "BATCH-20250604-001"),
                ("raw_material_used_kg", "12"),
                ("output_1.0kg", "10"),
            ]),
        ),
        (
            EntryKind::Return,
            form(&[
                ("date", "2025-06-05"),
                ("product", "0.5kg"),
                ("quantity", "2"),
                ("reason", "Damaged pouch"),
            ]),
        ),
        (
            EntryKind::Adjustment,
            form(&[
                ("date", "2025-06-06"),
                ("product", "1.0kg"),
                ("quantity", "-5"),
                ("reason", "Stock take"),
            ]),
        ),
    ];
    for (kind, fields) in &entries {
        let entry = Entry::from_form(*kind, fields);
        let outcome = recorder.record(&entry, day(10)).await.unwrap();
        assert_eq!(outcome.kind, *kind);
        assert!(outcome.backup.is_none());
    }

    let ledger = ledger_of(&config).await;
    let half = ledger.item("RC_0.5KG").unwrap();
    assert_eq!(half.sales, 30);
    assert_eq!(half.purchases, 20);
    assert_eq!(half.current_stock, 100 + 20 - 30 + 2);

    let kilo = ledger.item("RC_1.0KG").unwrap();
    assert_eq!(kilo.production, 10);
    assert_eq!(kilo.current_stock, 40 + 10 - 5);

    for item in ledger.items() {
        assert_eq!(
            item.current_stock,
            item.opening + item.purchases + item.production - item.sales + item.returns
                + item.adjustments,
            "running sum for {}",
            item.product.sku
        );
    }
    assert_eq!(ledger.item("RC_2.0KG").unwrap().status, StockStatus::OutOfStock);
}

#[tokio::test]
async fn test_invalid_entry_leaves_workbook_untouched() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_0.5KG", 10)]);
    let before = std::fs::read(&config.paths.workbook).unwrap();

    let storage = LocalStorage::default();
    let catalog = ProductCatalog::from_config(&config);
    let backups = BackupService::new(&config);
    let entry = Entry::from_form(
        EntryKind::Sale,
        &form(&[("date", "2025-06-20"), ("product", "9kg"), ("channel", "Amazon FBA")]),
    );

    let err = Recorder::new(&storage, &config, &catalog)
        .with_backups(&backups)
        .record(&entry, day(10))
        .await
        .unwrap_err();

    match err {
        InventoryError::ValidationError { errors } => {
            assert!(errors.iter().any(|e| e.contains("future")));
            assert!(errors.iter().any(|e| e.contains("not in the catalog")));
            assert!(errors.iter().any(|e| e.contains("Quantity")));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(std::fs::read(&config.paths.workbook).unwrap(), before);
    assert!(backups.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversell_is_saved_with_warning_and_backup() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    write_workbook(&config, &[("RC_1.5KG", 3)]);

    let storage = LocalStorage::default();
    let catalog = ProductCatalog::from_config(&config);
    let backups = BackupService::new(&config);
    let entry = Entry::from_form(
        EntryKind::Sale,
        &form(&[
            ("date", "2025-06-09"),
            ("product", "1.5kg"),
            ("channel", "flipkart"),
            ("quantity", "5"),
            ("unit_price", "150"),
        ]),
    );

    let outcome = Recorder::new(&storage, &config, &catalog)
        .with_backups(&backups)
        .record(&entry, day(10))
        .await
        .unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("exceed current stock of 3"));
    assert!(outcome.backup.is_some());
    assert_eq!(backups.list().await.unwrap().len(), 1);

    let ledger = ledger_of(&config).await;
    assert_eq!(ledger.item("RC_1.5KG").unwrap().current_stock, -2);
}

#[tokio::test]
async fn test_opening_entry_overwrites_stock_cell() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.backup.auto_backup = false;
    write_workbook(&config, &[("RC_0.2KG", 7)]);

    let storage = LocalStorage::default();
    let catalog = ProductCatalog::from_config(&config);
    let entry = Entry::from_form(
        EntryKind::Opening,
        &form(&[("date", "2025-06-01"), ("product", "0.2kg"), ("quantity", "250")]),
    );
    let outcome = Recorder::new(&storage, &config, &catalog)
        .record(&entry, day(10))
        .await
        .unwrap();
    assert_eq!(outcome.sheet, config.sheets.stock);

    let ledger = ledger_of(&config).await;
    assert_eq!(ledger.item("RC_0.2KG").unwrap().opening, 250);
    assert_eq!(ledger.items().len(), catalog.len());
}
