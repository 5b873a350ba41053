#![allow(dead_code)]

use chrono::NaiveDate;
use small_inventory::core::sheets::template_workbook;
use small_inventory::core::workbook::Cell;
use small_inventory::domain::model::ProductCatalog;
use small_inventory::AppConfig;
use std::path::Path;

/// Default configuration with every path inside `root`.
pub fn config_in(root: &Path) -> AppConfig {
    let mut config = AppConfig::with_defaults();
    config.paths.data_dir = root.join("data");
    config.paths.workbook = root.join("data/uploads/stock_report.xlsx");
    config.paths.exports_dir = root.join("data/exports");
    config.paths.backups_dir = root.join("data/backups");
    config.paths.logs_dir = root.join("logs");
    config
}

/// Template workbook with opening stock per product, written to the configured path.
pub fn write_workbook(config: &AppConfig, opening: &[(&str, i64)]) {
    let catalog = ProductCatalog::from_config(config);
    let mut workbook = template_workbook(config, &catalog);
    let stock = workbook
        .sheet_mut(&config.sheets.stock)
        .expect("template has a stock sheet");
    for (sku, quantity) in opening {
        let row = catalog
            .products()
            .iter()
            .position(|p| p.sku == *sku)
            .expect("known sku");
        stock
            .set(row, "Opening Stock", Cell::from(*quantity))
            .expect("opening stock column");
    }

    let path = &config.paths.workbook;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, workbook.to_xlsx().unwrap()).unwrap();
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}
