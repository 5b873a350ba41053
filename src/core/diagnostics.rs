use crate::config::{AppConfig, SUPPORTED_WORKBOOK_EXTENSIONS};
use crate::core::sheets::PRODUCT_KEYS;
use crate::core::workbook::Workbook;
use crate::domain::model::ProductCatalog;
use crate::utils::format::file_size;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }

    fn from_outcome(name: &str, outcome: std::result::Result<String, String>) -> Self {
        match outcome {
            Ok(detail) => Self::pass(name, detail),
            Err(detail) => Self::fail(name, detail),
        }
    }
}

/// Flat list of startup checks. Nothing is retried; fix the failures and run again.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub checks: Vec<CheckResult>,
}

impl Diagnostics {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Configuration checks first, then the workbook, then the output directories.
    pub async fn run(config: &AppConfig) -> Self {
        let mut checks = config_checks(config);
        checks.extend(workbook_checks(config).await);

        for (name, dir) in [
            ("Export directory", &config.paths.exports_dir),
            ("Backup directory", &config.paths.backups_dir),
        ] {
            checks.push(match tokio::fs::create_dir_all(dir).await {
                Ok(()) => CheckResult::pass(name, format!("{} is writable", dir.display())),
                Err(e) => CheckResult::fail(name, format!("Cannot create {}: {}", dir.display(), e)),
            });
        }

        let diagnostics = Self { checks };
        for check in &diagnostics.checks {
            if check.passed {
                tracing::debug!("✅ {}: {}", check.name, check.detail);
            } else {
                tracing::warn!("❌ {}: {}", check.name, check.detail);
            }
        }
        diagnostics
    }
}

fn config_checks(config: &AppConfig) -> Vec<CheckResult> {
    let catalog = ProductCatalog::from_config(config);
    let mut checks = vec![CheckResult::from_outcome(
        "Product catalog",
        if catalog.is_empty() {
            Err("No products configured".to_string())
        } else {
            Ok(format!("{} products", catalog.len()))
        },
    )];

    // 每個重量都要有袋子尺寸與 FNSKU
    let incomplete: Vec<String> = config
        .products
        .iter()
        .filter(|p| p.pouch_size.trim().is_empty() || p.fnsku.trim().is_empty())
        .map(|p| format!("{}kg", p.weight_kg))
        .collect();
    checks.push(CheckResult::from_outcome(
        "Product details",
        if config.products.is_empty() {
            Err("Product details table is missing".to_string())
        } else if incomplete.is_empty() {
            Ok(format!(
                "Pouch size and FNSKU set for weights {:?}",
                config.product_weights()
            ))
        } else {
            Err(format!("Missing pouch size or FNSKU for {}", incomplete.join(", ")))
        },
    ));

    checks.push(CheckResult::from_outcome(
        "Sales channels",
        if config.channels.is_empty() {
            Err("No sales channels configured".to_string())
        } else {
            Ok(config.channels.join(", "))
        },
    ));

    let t = &config.thresholds;
    checks.push(CheckResult::from_outcome(
        "Stock thresholds",
        if 0 <= t.critical_stock && t.critical_stock < t.low_stock && t.low_stock <= t.max_stock {
            Ok(format!(
                "critical {} < low {} <= max {}",
                t.critical_stock, t.low_stock, t.max_stock
            ))
        } else {
            Err(format!(
                "Expected critical < low <= max, got {} / {} / {}",
                t.critical_stock, t.low_stock, t.max_stock
            ))
        },
    ));

    checks
}

async fn workbook_checks(config: &AppConfig) -> Vec<CheckResult> {
    let path: &Path = &config.paths.workbook;
    let mut checks = Vec::new();

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            checks.push(CheckResult::pass("Workbook exists", path.display().to_string()));
            metadata
        }
        Err(e) => {
            checks.push(CheckResult::fail(
                "Workbook exists",
                format!("{}: {}", path.display(), e),
            ));
            return checks;
        }
    };

    if !metadata.is_file() {
        checks.push(CheckResult::fail("Workbook is a file", "Path is a directory"));
        return checks;
    }
    checks.push(CheckResult::pass("Workbook is a file", file_size(metadata.len())));

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    checks.push(CheckResult::from_outcome(
        "Workbook extension",
        if SUPPORTED_WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            Ok(format!(".{}", extension))
        } else {
            Err(format!(
                "'.{}' not in {}",
                extension,
                SUPPORTED_WORKBOOK_EXTENSIONS.join(", ")
            ))
        },
    ));

    let limit = config.thresholds.max_file_size_mb * 1024 * 1024;
    checks.push(CheckResult::from_outcome(
        "Workbook size",
        if metadata.len() <= limit {
            Ok(format!("{} (limit {})", file_size(metadata.len()), file_size(limit)))
        } else {
            Err(format!("{} exceeds {}", file_size(metadata.len()), file_size(limit)))
        },
    ));

    let workbook = match tokio::fs::read(path).await {
        Ok(bytes) => Workbook::from_bytes(&bytes),
        Err(e) => Err(e.into()),
    };
    let workbook = match workbook {
        Ok(workbook) => {
            checks.push(CheckResult::pass(
                "Workbook opens",
                format!("{} sheets", workbook.sheet_names().len()),
            ));
            workbook
        }
        Err(e) => {
            checks.push(CheckResult::fail("Workbook opens", e.to_string()));
            return checks;
        }
    };

    let missing = workbook.missing_sheets(&config.sheets.required);
    checks.push(CheckResult::from_outcome(
        "Required sheets",
        if missing.is_empty() {
            Ok(config.sheets.required.join(", "))
        } else {
            Err(format!("Missing: {}", missing.join(", ")))
        },
    ));

    checks.push(CheckResult::from_outcome(
        "Stock sheet product column",
        match workbook.sheet(&config.sheets.stock) {
            None => Err(format!("Sheet '{}' not found", config.sheets.stock)),
            Some(table) => match table.find_column(PRODUCT_KEYS) {
                Some(idx) => Ok(format!("Column '{}'", table.raw_headers[idx])),
                None => Err("No Product, SKU, FNSKU or Weight column".to_string()),
            },
        },
    ));

    checks
}
