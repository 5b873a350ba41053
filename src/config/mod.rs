#[cfg(feature = "cli")]
pub mod cli;

use crate::domain::ports::ConfigProvider;
use crate::utils::error::{InventoryError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "Inventory Management System";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppInfo,
    pub paths: PathsConfig,
    pub sheets: SheetNames,
    pub products: Vec<ProductConfig>,
    pub thresholds: ThresholdConfig,
    pub channels: Vec<String>,
    pub backup: BackupConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub export: ExportConfig,
    pub dashboard: DashboardConfig,
    /// 設定檔本身的路徑，供完整備份使用
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    pub description: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            description: "Inventory management with Excel integration".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub workbook: PathBuf,
    pub exports_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            workbook: PathBuf::from("data/uploads/stock_report.xlsx"),
            exports_dir: PathBuf::from("data/exports"),
            backups_dir: PathBuf::from("data/backups"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub stock: String,
    pub returns: String,
    pub packaging: String,
    pub cartons: String,
    /// The workbook spells this sheet "Packging".
    pub packing: String,
    pub sales_log: String,
    pub purchase_log: String,
    pub production_log: String,
    pub return_log: String,
    pub adjustment_log: String,
    pub required: Vec<String>,
}

impl Default for SheetNames {
    fn default() -> Self {
        let stock = "stock sheet".to_string();
        let returns = "Return".to_string();
        let packaging = "Packaging".to_string();
        let cartons = "Cartoons report".to_string();
        let packing = "Packging".to_string();
        Self {
            required: vec![
                stock.clone(),
                returns.clone(),
                packaging.clone(),
                cartons.clone(),
                packing.clone(),
            ],
            stock,
            returns,
            packaging,
            cartons,
            packing,
            sales_log: "Sales_Log".to_string(),
            purchase_log: "Purchase_Log".to_string(),
            production_log: "Production_Log".to_string(),
            return_log: "Return_Log".to_string(),
            adjustment_log: "Adjustment_Log".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub weight_kg: f64,
    pub pouch_size: String,
    pub fnsku: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub min_stock: Option<i64>,
    #[serde(default)]
    pub max_stock: Option<i64>,
}

pub fn default_products() -> Vec<ProductConfig> {
    [
        (0.2, "6*9", "X00289LA0X"),
        (0.5, "7*10", "X00289J14Z"),
        (1.0, "9*12", "X00289HWX7"),
        (1.5, "11*16", "X00289LA0N"),
        (2.0, "11*16", "X00289L9ZT"),
    ]
    .into_iter()
    .map(|(weight_kg, pouch_size, fnsku)| ProductConfig {
        weight_kg,
        pouch_size: pouch_size.to_string(),
        fnsku: fnsku.to_string(),
        name: None,
        unit_price: None,
        min_stock: None,
        max_stock: None,
    })
    .collect()
}

pub fn default_channels() -> Vec<String> {
    [
        "Amazon FBA",
        "Amazon Easyship",
        "Flipkart",
        "Others",
        "Direct Sales",
        "Retail",
        "Wholesale",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub low_stock: i64,
    pub critical_stock: i64,
    pub max_stock: i64,
    pub price_per_kg: f64,
    pub max_quantity: i64,
    pub max_price: f64,
    pub max_file_size_mb: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            low_stock: 10,
            critical_stock: 5,
            max_stock: 1000,
            price_per_kg: 100.0,
            max_quantity: 10_000,
            max_price: 10_000.0,
            max_file_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub auto_backup: bool,
    pub max_backups: usize,
    pub include_logs_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            auto_backup: true,
            max_backups: 50,
            include_logs_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file: bool,
    pub directory: Option<PathBuf>,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: false,
            directory: None,
            max_files: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub formats: Vec<String>,
    pub compress: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            formats: vec!["xlsx".to_string()],
            compress: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub date_range_days: i64,
    pub recent_activity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            date_range_days: 30,
            recent_activity: 10,
        }
    }
}

pub const SUPPORTED_WORKBOOK_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "ods"];
pub const SUPPORTED_EXPORT_FORMATS: [&str; 4] = ["xlsx", "csv", "json", "html"];
/// 天數設定上限（十年）
pub const MAX_DAY_SPAN: i64 = 3650;

impl AppConfig {
    /// 載入設定；檔案不存在時使用預設值
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::with_defaults());
        }
        let mut config = Self::from_file(path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        let mut config: Self =
            toml::from_str(&processed).map_err(|e| InventoryError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.fill_defaults();
        Ok(config)
    }

    pub fn with_defaults() -> Self {
        let mut config = Self::default();
        config.fill_defaults();
        config
    }

    fn fill_defaults(&mut self) {
        if self.products.is_empty() {
            self.products = default_products();
        }
        if self.channels.is_empty() {
            self.channels = default_channels();
        }
    }

    /// 替換環境變數 (例如 ${DATA_DIR})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| InventoryError::config(format!("env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn product_weights(&self) -> Vec<f64> {
        self.products.iter().map(|p| p.weight_kg).collect()
    }

    pub fn is_known_channel(&self, channel: &str) -> bool {
        self.channels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(channel.trim()))
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("paths.workbook", &self.paths.workbook.to_string_lossy())?;
        validation::validate_file_extension(
            "paths.workbook",
            &self.paths.workbook.to_string_lossy(),
            &SUPPORTED_WORKBOOK_EXTENSIONS,
        )?;
        validation::validate_path("paths.exports_dir", &self.paths.exports_dir.to_string_lossy())?;
        validation::validate_path("paths.backups_dir", &self.paths.backups_dir.to_string_lossy())?;
        validation::validate_non_empty_string("sheets.stock", &self.sheets.stock)?;
        validation::validate_positive_number("backup.max_backups", self.backup.max_backups, 1)?;
        validation::validate_range(
            "backup.include_logs_days",
            self.backup.include_logs_days,
            0,
            MAX_DAY_SPAN,
        )?;
        validation::validate_range(
            "dashboard.date_range_days",
            self.dashboard.date_range_days,
            1,
            MAX_DAY_SPAN,
        )?;

        if self.products.is_empty() {
            return Err(InventoryError::MissingConfigError {
                field: "products".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (idx, product) in self.products.iter().enumerate() {
            let field = format!("products[{}]", idx);
            validation::validate_range(&format!("{}.weight_kg", field), product.weight_kg, 0.1, 50.0)?;
            validation::validate_non_empty_string(&format!("{}.pouch_size", field), &product.pouch_size)?;
            validation::validate_non_empty_string(&format!("{}.fnsku", field), &product.fnsku)?;
            if !seen.insert(product.fnsku.to_ascii_uppercase()) {
                return Err(InventoryError::InvalidConfigValueError {
                    field: format!("{}.fnsku", field),
                    value: product.fnsku.clone(),
                    reason: "Duplicate FNSKU".to_string(),
                });
            }
        }

        if self.channels.is_empty() {
            return Err(InventoryError::MissingConfigError {
                field: "channels".to_string(),
            });
        }

        let t = &self.thresholds;
        if t.critical_stock < 0 || t.critical_stock >= t.low_stock || t.low_stock > t.max_stock {
            return Err(InventoryError::InvalidConfigValueError {
                field: "thresholds".to_string(),
                value: format!(
                    "critical={}, low={}, max={}",
                    t.critical_stock, t.low_stock, t.max_stock
                ),
                reason: "Thresholds must satisfy 0 <= critical < low <= max".to_string(),
            });
        }

        for format in &self.export.formats {
            if !SUPPORTED_EXPORT_FORMATS.contains(&format.as_str()) {
                return Err(InventoryError::InvalidConfigValueError {
                    field: "export.formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        SUPPORTED_EXPORT_FORMATS.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }
}

impl ConfigProvider for AppConfig {
    fn workbook_path(&self) -> &Path {
        &self.paths.workbook
    }

    fn exports_dir(&self) -> &Path {
        &self.paths.exports_dir
    }

    fn backups_dir(&self) -> &Path {
        &self.paths.backups_dir
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();

        assert_eq!(config.sheets.stock, "stock sheet");
        assert_eq!(config.sheets.packing, "Packging");
        assert_eq!(config.products.len(), 5);
        assert_eq!(config.product_weights(), vec![0.2, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(config.channels.len(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_products_and_thresholds() {
        let toml_content = r#"
channels = ["Amazon FBA", "Flipkart"]

[thresholds]
low_stock = 20
critical_stock = 4

[[products]]
weight_kg = 0.5
pouch_size = "7*10"
fnsku = "X00289J14Z"
unit_price = 55.0
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.products.len(), 1);
        assert_eq!(config.products[0].unit_price, Some(55.0));
        assert_eq!(config.thresholds.low_stock, 20);
        assert_eq!(config.thresholds.max_stock, 1000);
        assert!(config.is_known_channel("flipkart"));
        assert!(!config.is_known_channel("Retail"));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SMALL_INVENTORY_TEST_DATA", "/srv/stock");

        let toml_content = r#"
[paths]
workbook = "${SMALL_INVENTORY_TEST_DATA}/stock.xlsx"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.paths.workbook, PathBuf::from("/srv/stock/stock.xlsx"));

        std::env::remove_var("SMALL_INVENTORY_TEST_DATA");
    }

    #[test]
    fn test_threshold_order_is_validated() {
        let toml_content = r#"
[thresholds]
low_stock = 5
critical_stock = 8
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_day_spans_are_bounded() {
        let config = AppConfig::from_toml_str("[dashboard]\ndate_range_days = 200000000\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dashboard.date_range_days"));

        let config = AppConfig::from_toml_str("[dashboard]\ndate_range_days = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str("[backup]\ninclude_logs_days = -1\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backup.include_logs_days"));
    }

    #[test]
    fn test_duplicate_fnsku_rejected() {
        let toml_content = r#"
[[products]]
weight_kg = 1.0
pouch_size = "9*12"
fnsku = "X00289HWX7"

[[products]]
weight_kg = 2.0
pouch_size = "11*16"
fnsku = "x00289hwx7"
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("products[1].fnsku"));
    }

    #[test]
    fn test_missing_product_details_rejected() {
        let toml_content = r#"
[[products]]
weight_kg = 1.0
pouch_size = ""
fnsku = "X00289HWX7"
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pouch_size"));
    }

    #[test]
    fn test_unsupported_export_format_rejected() {
        let toml_content = r#"
[export]
formats = ["pdf"]
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_remembers_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[app]\nname = \"Chana Stock\"\n")
            .unwrap();

        let config = AppConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.app.name, "Chana Stock");
        assert_eq!(config.source_path.as_deref(), Some(temp_file.path()));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("/definitely/not/here.toml").unwrap();
        assert!(config.source_path.is_none());
        assert_eq!(config.products.len(), 5);
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = AppConfig::from_toml_str(include_str!("../../inventory.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.products.len(), 5);
        assert_eq!(config.exports_dir(), Path::new("data/exports"));
        assert_eq!(config.backups_dir(), Path::new("data/backups"));
        assert!(config.logging.file);
    }
}
