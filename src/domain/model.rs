use crate::config::AppConfig;
use crate::utils::format::{product_code, weight_label};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static WEIGHT_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*kg").expect("valid weight pattern")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub weight_kg: f64,
    pub pouch_size: String,
    pub fnsku: String,
    pub unit_price: f64,
    pub category: String,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
}

impl Product {
    pub fn display_label(&self) -> String {
        weight_label(self.weight_kg)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.display_label())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let products = config
            .products
            .iter()
            .map(|p| Product {
                sku: product_code(p.weight_kg, "RC"),
                name: p.name.clone().unwrap_or_else(|| "Roasted Chana".to_string()),
                weight_kg: p.weight_kg,
                pouch_size: p.pouch_size.clone(),
                fnsku: p.fnsku.clone(),
                unit_price: p
                    .unit_price
                    .unwrap_or(p.weight_kg * config.thresholds.price_per_kg),
                category: "Roasted Chana".to_string(),
                min_stock: p.min_stock,
                max_stock: p.max_stock,
            })
            .collect();
        Self { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn get(&self, sku: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.sku.eq_ignore_ascii_case(sku.trim()))
    }

    pub fn by_weight(&self, weight_kg: f64) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| (p.weight_kg - weight_kg).abs() < 1e-9)
    }

    /// 將表格儲存格文字對應到商品：SKU、FNSKU、"0.5kg" 標籤或純數字重量
    pub fn resolve(&self, text: &str) -> Option<&Product> {
        let cleaned = text.trim();
        if cleaned.is_empty() {
            return None;
        }

        if let Some(product) = self.products.iter().find(|p| {
            p.sku.eq_ignore_ascii_case(cleaned) || p.fnsku.eq_ignore_ascii_case(cleaned)
        }) {
            return Some(product);
        }

        if let Some(caps) = WEIGHT_IN_TEXT.captures(cleaned) {
            if let Ok(weight) = caps[1].parse::<f64>() {
                return self.by_weight(weight);
            }
        }

        cleaned
            .parse::<f64>()
            .ok()
            .and_then(|weight| self.by_weight(weight))
    }

    pub fn search(&self, query: &str) -> Vec<&Product> {
        let query = query.trim().to_lowercase();
        self.products
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&query)
                    || p.display_label().contains(&query)
                    || p.sku.to_lowercase().contains(&query)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SalesChannel {
    AmazonFba,
    AmazonEasyship,
    Flipkart,
    DirectSales,
    Retail,
    Wholesale,
    Others,
}

impl SalesChannel {
    pub const ALL: [SalesChannel; 7] = [
        SalesChannel::AmazonFba,
        SalesChannel::AmazonEasyship,
        SalesChannel::Flipkart,
        SalesChannel::DirectSales,
        SalesChannel::Retail,
        SalesChannel::Wholesale,
        SalesChannel::Others,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::AmazonFba => "Amazon FBA",
            Self::AmazonEasyship => "Amazon Easyship",
            Self::Flipkart => "Flipkart",
            Self::DirectSales => "Direct Sales",
            Self::Retail => "Retail",
            Self::Wholesale => "Wholesale",
            Self::Others => "Others",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::AmazonFba => "AMZ",
            Self::AmazonEasyship => "AME",
            Self::Flipkart => "FKT",
            Self::DirectSales => "DIR",
            Self::Retail => "RTL",
            Self::Wholesale => "WHL",
            Self::Others => "OTH",
        }
    }

    /// Strict match against channel names; used by form validation.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// 表格欄位與文字的寬鬆對應；無法辨識時歸入 Others
    pub fn parse_lenient(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if let Some(channel) = Self::from_name(&lower) {
            return channel;
        }
        if lower.contains("fba") {
            Self::AmazonFba
        } else if lower.contains("easyship") || lower.contains("easy ship") {
            Self::AmazonEasyship
        } else if lower.contains("flipkart") {
            Self::Flipkart
        } else if lower.contains("direct") {
            Self::DirectSales
        } else if lower.contains("retail") {
            Self::Retail
        } else if lower.contains("wholesale") {
            Self::Wholesale
        } else {
            Self::Others
        }
    }
}

impl fmt::Display for SalesChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Opening,
    Purchase,
    Production,
    Sale,
    Return,
    Adjustment,
}

impl TransactionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opening => "Opening Stock",
            Self::Purchase => "Purchase",
            Self::Production => "Production",
            Self::Sale => "Sale",
            Self::Return => "Return",
            Self::Adjustment => "Stock Adjustment",
        }
    }

    /// +1 for inflows, -1 for sales. Adjustments keep the sign of their quantity.
    pub fn sign(&self) -> i64 {
        match self {
            Self::Sale => -1,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub date: Option<NaiveDate>,
    pub sku: String,
    /// Magnitude for every kind except `Adjustment`, which carries its own sign.
    pub quantity: i64,
    pub unit_price: Option<f64>,
    pub amount: Option<f64>,
    pub channel: Option<SalesChannel>,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub source: String,
}

impl Transaction {
    pub fn new(kind: TransactionKind, sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            kind,
            date: None,
            sku: sku.into(),
            quantity,
            unit_price: None,
            amount: None,
            channel: None,
            reference: None,
            note: None,
            source: String::new(),
        }
    }

    pub fn signed_quantity(&self) -> i64 {
        match self.kind {
            TransactionKind::Adjustment => self.quantity,
            kind => kind.sign() * self.quantity.abs(),
        }
    }

    pub fn value(&self) -> f64 {
        self.amount
            .or_else(|| self.unit_price.map(|p| p * self.quantity.abs() as f64))
            .unwrap_or(0.0)
    }
}

/// One row of the stock sheet, already resolved to a SKU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockRow {
    pub sku: String,
    pub label: String,
    pub opening: i64,
    pub purchases: i64,
    pub production: i64,
    pub sales: Vec<(SalesChannel, i64)>,
    pub returns: i64,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub unit_price: Option<f64>,
    pub recorded_closing: Option<i64>,
    pub row_number: usize,
}

impl StockRow {
    /// 表格中的彙總欄位轉為無日期的異動
    pub fn movements(&self, source: &str) -> Vec<Transaction> {
        let mut out = Vec::new();
        let mut push = |kind, quantity: i64, channel: Option<SalesChannel>| {
            if quantity != 0 {
                let mut tx = Transaction::new(kind, self.sku.clone(), quantity);
                tx.channel = channel;
                tx.unit_price = self.unit_price;
                tx.source = source.to_string();
                out.push(tx);
            }
        };
        push(TransactionKind::Purchase, self.purchases, None);
        push(TransactionKind::Production, self.production, None);
        for (channel, quantity) in &self.sales {
            push(TransactionKind::Sale, *quantity, Some(*channel));
        }
        push(TransactionKind::Return, self.returns, None);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StockStatus {
    OutOfStock,
    Critical,
    Low,
    Normal,
    Overstocked,
}

impl StockStatus {
    pub const ALL: [StockStatus; 5] = [
        StockStatus::OutOfStock,
        StockStatus::Critical,
        StockStatus::Low,
        StockStatus::Normal,
        StockStatus::Overstocked,
    ];

    pub fn classify(current: i64, critical: i64, min_stock: i64, max_stock: i64) -> Self {
        if current <= 0 {
            Self::OutOfStock
        } else if current <= critical {
            Self::Critical
        } else if current <= min_stock {
            Self::Low
        } else if current >= max_stock {
            Self::Overstocked
        } else {
            Self::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OutOfStock => "Out of Stock",
            Self::Critical => "Critical",
            Self::Low => "Low Stock",
            Self::Normal => "Normal",
            Self::Overstocked => "Overstocked",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::OutOfStock => "#dc3545",
            Self::Critical => "#fd7e14",
            Self::Low => "#ffc107",
            Self::Normal => "#28a745",
            Self::Overstocked => "#6f42c1",
        }
    }

    pub fn needs_reorder(&self) -> bool {
        matches!(self, Self::OutOfStock | Self::Critical | Self::Low)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryItem {
    pub product: Product,
    pub opening: i64,
    pub purchases: i64,
    pub production: i64,
    pub sales: i64,
    pub returns: i64,
    pub adjustments: i64,
    pub current_stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub unit_price: f64,
    pub recorded_closing: Option<i64>,
    pub status: StockStatus,
}

impl InventoryItem {
    pub fn stock_value(&self) -> f64 {
        self.current_stock.max(0) as f64 * self.unit_price
    }

    pub fn reorder_quantity(&self) -> i64 {
        (self.max_stock - self.current_stock).max(0)
    }

    /// 表格記錄的期末數與計算結果的差異
    pub fn closing_variance(&self) -> Option<i64> {
        self.recorded_closing.map(|recorded| recorded - self.current_stock)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMaterialMovement {
    pub date: Option<NaiveDate>,
    pub material: String,
    pub supplier: Option<String>,
    /// Positive for purchases, negative for consumption.
    pub quantity_kg: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingRow {
    pub material: String,
    pub opening: i64,
    pub received: i64,
    pub used: i64,
    pub recorded_closing: Option<i64>,
}

impl PackagingRow {
    pub fn closing(&self) -> i64 {
        self.opening + self.received - self.used
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartonRow {
    pub date: Option<NaiveDate>,
    pub sku: String,
    pub cartons: i64,
    pub units_per_carton: i64,
    pub destination: Option<String>,
}

impl CartonRow {
    pub fn units(&self) -> i64 {
        self.cartons * self.units_per_carton
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingRow {
    pub date: Option<NaiveDate>,
    pub sku: String,
    pub quantity: i64,
}

/// Everything parsed from one workbook load.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    pub stock_rows: Vec<StockRow>,
    pub transactions: Vec<Transaction>,
    pub raw_materials: Vec<RawMaterialMovement>,
    pub packaging: Vec<PackagingRow>,
    pub cartons: Vec<CartonRow>,
    pub packing: Vec<PackingRow>,
    pub sheet_names: Vec<String>,
    pub warnings: Vec<String>,
}

impl InventorySnapshot {
    pub fn dated_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.date.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ProductCatalog {
        ProductCatalog::from_config(&AppConfig::with_defaults())
    }

    #[test]
    fn test_catalog_from_default_config() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 5);
        let product = catalog.get("RC_0.5KG").unwrap();
        assert_eq!(product.pouch_size, "7*10");
        assert_eq!(product.fnsku, "X00289J14Z");
        assert!((product.unit_price - 50.0).abs() < 1e-9);
        assert_eq!(product.display_name(), "Roasted Chana 0.5kg");
    }

    #[test]
    fn test_resolve_accepts_common_spellings() {
        let catalog = catalog();
        for text in ["0.5kg", "0.5 KG", "Roasted chana (0.5kg)", "x00289j14z", "rc_0.5kg", "0.5"] {
            let product = catalog.resolve(text);
            assert_eq!(product.map(|p| p.sku.as_str()), Some("RC_0.5KG"), "text: {text}");
        }
        assert!(catalog.resolve("3kg").is_none());
        assert!(catalog.resolve("   ").is_none());
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!(SalesChannel::parse_lenient("FBA"), SalesChannel::AmazonFba);
        assert_eq!(SalesChannel::parse_lenient("easyship"), SalesChannel::AmazonEasyship);
        assert_eq!(SalesChannel::parse_lenient("Flipkart "), SalesChannel::Flipkart);
        assert_eq!(SalesChannel::parse_lenient("meesho"), SalesChannel::Others);
        assert_eq!(SalesChannel::from_name("amazon fba"), Some(SalesChannel::AmazonFba));
        assert_eq!(SalesChannel::from_name("fba"), None);
    }

    #[test]
    fn test_signed_quantities() {
        assert_eq!(Transaction::new(TransactionKind::Sale, "A", 4).signed_quantity(), -4);
        assert_eq!(Transaction::new(TransactionKind::Return, "A", 2).signed_quantity(), 2);
        assert_eq!(Transaction::new(TransactionKind::Adjustment, "A", -3).signed_quantity(), -3);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(StockStatus::classify(0, 5, 10, 100), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(5, 5, 10, 100), StockStatus::Critical);
        assert_eq!(StockStatus::classify(10, 5, 10, 100), StockStatus::Low);
        assert_eq!(StockStatus::classify(50, 5, 10, 100), StockStatus::Normal);
        assert_eq!(StockStatus::classify(100, 5, 10, 100), StockStatus::Overstocked);
    }

    #[test]
    fn test_stock_row_movements_skip_zero_columns() {
        let row = StockRow {
            sku: "RC_1.0KG".to_string(),
            purchases: 10,
            sales: vec![(SalesChannel::AmazonFba, 3), (SalesChannel::Flipkart, 0)],
            ..StockRow::default()
        };
        let movements = row.movements("stock sheet");
        assert_eq!(movements.len(), 2);
        assert_eq!(movements.iter().map(Transaction::signed_quantity).sum::<i64>(), 7);
    }
}
