use crate::config::ThresholdConfig;
use crate::domain::model::{
    InventoryItem, InventorySnapshot, ProductCatalog, SalesChannel, StockRow, StockStatus,
    Transaction, TransactionKind,
};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// The `days` days ending on `today`. Spans reaching past the calendar start at its first day.
    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        let start = Duration::try_days(days.saturating_sub(1).max(0))
            .and_then(|span| today.checked_sub_signed(span))
            .unwrap_or(NaiveDate::MIN);
        Self::new(start, today)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    fn admits(range: Option<&DateRange>, date: Option<NaiveDate>) -> bool {
        match (range, date) {
            (None, _) => true,
            (Some(r), Some(d)) => r.contains(d),
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InventorySummary {
    pub product_count: usize,
    pub total_units: i64,
    pub total_value: f64,
    pub average_stock: f64,
    pub status_counts: Vec<(StockStatus, usize)>,
    pub reorder_needed: usize,
    pub closing_variances: usize,
}

impl InventorySummary {
    pub fn count(&self, status: StockStatus) -> usize {
        self.status_counts
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Urgency {
    Emergency,
    Critical,
    High,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReorderRecommendation {
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub quantity: i64,
    pub urgency: Urgency,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValuationMethod {
    Current,
    WeightedAverage,
}

impl std::str::FromStr for ValuationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "current" => Ok(Self::Current),
            "weighted_average" | "average" => Ok(Self::WeightedAverage),
            other => Err(format!("unknown valuation method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValuationLine {
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub value: f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Valuation {
    pub method: ValuationMethod,
    pub lines: Vec<ValuationLine>,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockTakeLine {
    pub sku: String,
    pub system: i64,
    pub counted: i64,
    pub variance: i64,
    pub variance_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementLine {
    pub date: Option<NaiveDate>,
    pub kind: TransactionKind,
    pub quantity: i64,
    pub balance: i64,
    pub reference: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelSales {
    pub channel: Option<SalesChannel>,
    pub units: i64,
    pub revenue: f64,
    pub orders: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub units: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkuSales {
    pub sku: String,
    pub name: String,
    pub units: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnoverLine {
    pub sku: String,
    pub sales: i64,
    pub average_inventory: f64,
    pub ratio: f64,
    /// `None` when nothing sold.
    pub days_to_sell: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbcLine {
    pub rank: usize,
    pub sku: String,
    pub name: String,
    pub revenue: f64,
    pub share_pct: f64,
    pub cumulative_pct: f64,
    pub class: AbcClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialLine {
    pub material: String,
    pub opening: i64,
    pub received: i64,
    pub used: i64,
    pub closing: i64,
    pub recorded_closing: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PackagingSummary {
    pub materials: Vec<MaterialLine>,
    /// Pouches consumed per pouch size, from packing rows.
    pub pouch_usage: Vec<(String, i64)>,
    /// (sku, cartons, units) from the carton report.
    pub carton_units: Vec<(String, i64, i64)>,
    pub raw_material_kg: f64,
}

pub const LEAD_TIME_DAYS: f64 = 7.0;

pub fn z_score(service_level: f64) -> f64 {
    if (service_level - 0.90).abs() < 1e-9 {
        1.28
    } else if (service_level - 0.99).abs() < 1e-9 {
        2.33
    } else {
        1.65
    }
}

/// Per-SKU stock positions plus every movement behind them.
#[derive(Debug, Clone)]
pub struct Ledger {
    items: Vec<InventoryItem>,
    movements: Vec<Transaction>,
    thresholds: ThresholdConfig,
}

impl Ledger {
    /// `current = opening + Σ signed quantities` per catalog SKU.
    pub fn build(
        catalog: &ProductCatalog,
        stock_rows: &[StockRow],
        transactions: &[Transaction],
        thresholds: &ThresholdConfig,
    ) -> Self {
        let mut movements: Vec<Transaction> = Vec::new();
        for row in stock_rows {
            movements.extend(row.movements("stock sheet"));
        }
        movements.extend(transactions.iter().cloned());

        let items = catalog
            .products()
            .iter()
            .map(|product| {
                let rows: Vec<&StockRow> = stock_rows.iter().filter(|r| r.sku == product.sku).collect();
                let opening: i64 = rows.iter().map(|r| r.opening).sum();

                let mut totals: HashMap<TransactionKind, i64> = HashMap::new();
                for tx in movements.iter().filter(|t| t.sku == product.sku) {
                    *totals.entry(tx.kind).or_default() += tx.signed_quantity();
                }
                let total = |kind: TransactionKind| totals.get(&kind).copied().unwrap_or(0);

                let current_stock = opening + totals.values().sum::<i64>();
                let min_stock = rows
                    .iter()
                    .find_map(|r| r.min_stock)
                    .or(product.min_stock)
                    .unwrap_or(thresholds.low_stock);
                let max_stock = rows
                    .iter()
                    .find_map(|r| r.max_stock)
                    .or(product.max_stock)
                    .unwrap_or(thresholds.max_stock);
                let unit_price = rows
                    .iter()
                    .find_map(|r| r.unit_price)
                    .unwrap_or(product.unit_price);
                let recorded_closing = rows
                    .iter()
                    .filter_map(|r| r.recorded_closing)
                    .reduce(|a, b| a + b);

                InventoryItem {
                    product: product.clone(),
                    opening,
                    purchases: total(TransactionKind::Purchase),
                    production: total(TransactionKind::Production),
                    sales: -total(TransactionKind::Sale),
                    returns: total(TransactionKind::Return),
                    adjustments: total(TransactionKind::Adjustment) + total(TransactionKind::Opening),
                    current_stock,
                    min_stock,
                    max_stock,
                    unit_price,
                    recorded_closing,
                    status: StockStatus::classify(
                        current_stock,
                        thresholds.critical_stock,
                        min_stock,
                        max_stock,
                    ),
                }
            })
            .collect();

        Self {
            items,
            movements,
            thresholds: thresholds.clone(),
        }
    }

    pub fn from_snapshot(
        catalog: &ProductCatalog,
        snapshot: &InventorySnapshot,
        thresholds: &ThresholdConfig,
    ) -> Self {
        Self::build(catalog, &snapshot.stock_rows, &snapshot.transactions, thresholds)
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn item(&self, sku: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.product.sku == sku)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.movements
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn summary(&self) -> InventorySummary {
        let total_units: i64 = self.items.iter().map(|i| i.current_stock).sum();
        let product_count = self.items.len();
        let status_counts = StockStatus::ALL
            .iter()
            .map(|status| (*status, self.items.iter().filter(|i| i.status == *status).count()))
            .collect();

        InventorySummary {
            product_count,
            total_units,
            total_value: self.items.iter().map(InventoryItem::stock_value).sum(),
            average_stock: if product_count > 0 {
                total_units as f64 / product_count as f64
            } else {
                0.0
            },
            status_counts,
            reorder_needed: self.items.iter().filter(|i| i.status.needs_reorder()).count(),
            closing_variances: self
                .items
                .iter()
                .filter(|i| i.closing_variance().is_some_and(|v| v != 0))
                .count(),
        }
    }

    pub fn reorder_recommendations(&self) -> Vec<ReorderRecommendation> {
        let mut out: Vec<ReorderRecommendation> = self
            .items
            .iter()
            .filter_map(|item| {
                let urgency = match item.status {
                    StockStatus::OutOfStock => Urgency::Emergency,
                    StockStatus::Critical => Urgency::Critical,
                    StockStatus::Low => Urgency::High,
                    _ => return None,
                };
                let quantity = item.reorder_quantity();
                Some(ReorderRecommendation {
                    sku: item.product.sku.clone(),
                    name: item.product.display_name(),
                    current_stock: item.current_stock,
                    min_stock: item.min_stock,
                    max_stock: item.max_stock,
                    quantity,
                    urgency,
                    estimated_cost: quantity as f64 * item.unit_price,
                })
            })
            .collect();
        out.sort_by(|a, b| a.urgency.cmp(&b.urgency).then_with(|| a.current_stock.cmp(&b.current_stock)));
        out
    }

    /// Quantity-weighted average of priced inflows, opening stock counted at list price.
    fn average_cost(&self, item: &InventoryItem) -> f64 {
        let mut units = item.opening.max(0) as f64;
        let mut cost = units * item.unit_price;
        for tx in self.movements.iter().filter(|t| {
            t.sku == item.product.sku
                && matches!(t.kind, TransactionKind::Purchase | TransactionKind::Production)
        }) {
            let price = tx
                .unit_price
                .or_else(|| tx.amount.map(|a| a / tx.quantity.abs().max(1) as f64))
                .unwrap_or(item.unit_price);
            units += tx.quantity.abs() as f64;
            cost += tx.quantity.abs() as f64 * price;
        }
        if units > 0.0 {
            cost / units
        } else {
            item.unit_price
        }
    }

    pub fn valuation(&self, method: ValuationMethod) -> Valuation {
        let mut lines: Vec<ValuationLine> = self
            .items
            .iter()
            .map(|item| {
                let unit_cost = match method {
                    ValuationMethod::Current => item.unit_price,
                    ValuationMethod::WeightedAverage => self.average_cost(item),
                };
                let quantity = item.current_stock.max(0);
                ValuationLine {
                    sku: item.product.sku.clone(),
                    name: item.product.display_name(),
                    quantity,
                    unit_cost,
                    value: quantity as f64 * unit_cost,
                    share_pct: 0.0,
                }
            })
            .collect();

        let total: f64 = lines.iter().map(|l| l.value).sum();
        if total > 0.0 {
            for line in &mut lines {
                line.share_pct = line.value / total * 100.0;
            }
        }
        Valuation { method, lines, total }
    }

    /// Counted minus system stock, for the SKUs that were counted.
    pub fn stock_take(&self, counts: &HashMap<String, i64>) -> Vec<StockTakeLine> {
        self.items
            .iter()
            .filter_map(|item| {
                let counted = *counts.get(&item.product.sku)?;
                let system = item.current_stock;
                let variance = counted - system;
                let variance_pct = if system != 0 {
                    variance as f64 / system as f64 * 100.0
                } else if counted == 0 {
                    0.0
                } else {
                    100.0
                };
                Some(StockTakeLine {
                    sku: item.product.sku.clone(),
                    system,
                    counted,
                    variance,
                    variance_pct,
                })
            })
            .collect()
    }

    /// Chronological running balance; undated sheet totals come before dated entries.
    pub fn movements(&self, sku: &str) -> Vec<MovementLine> {
        let Some(item) = self.item(sku) else {
            return Vec::new();
        };

        let mut entries: Vec<&Transaction> = self.movements.iter().filter(|t| t.sku == sku).collect();
        entries.sort_by_key(|t| t.date);

        let mut balance = item.opening;
        let mut lines = vec![MovementLine {
            date: None,
            kind: TransactionKind::Opening,
            quantity: item.opening,
            balance,
            reference: None,
            source: "stock sheet".to_string(),
        }];
        for tx in entries {
            balance += tx.signed_quantity();
            lines.push(MovementLine {
                date: tx.date,
                kind: tx.kind,
                quantity: tx.signed_quantity(),
                balance,
                reference: tx.reference.clone(),
                source: tx.source.clone(),
            });
        }
        lines
    }

    /// Recorded value, or list price times quantity when nothing was recorded.
    pub fn revenue(&self, tx: &Transaction) -> f64 {
        let value = tx.value();
        if value > 0.0 {
            return value;
        }
        self.item(&tx.sku)
            .map(|i| i.unit_price * tx.quantity.abs() as f64)
            .unwrap_or(0.0)
    }

    pub fn sales(&self, range: Option<&DateRange>) -> Vec<&Transaction> {
        self.of_kind(TransactionKind::Sale, range)
    }

    pub fn of_kind(&self, kind: TransactionKind, range: Option<&DateRange>) -> Vec<&Transaction> {
        self.movements
            .iter()
            .filter(|t| t.kind == kind && DateRange::admits(range, t.date))
            .collect()
    }

    pub fn sales_by_channel(&self, range: Option<&DateRange>) -> Vec<ChannelSales> {
        let mut by_channel: BTreeMap<Option<SalesChannel>, ChannelSales> = BTreeMap::new();
        for tx in self.sales(range) {
            let entry = by_channel.entry(tx.channel).or_insert_with(|| ChannelSales {
                channel: tx.channel,
                ..ChannelSales::default()
            });
            entry.units += tx.quantity.abs();
            entry.revenue += self.revenue(tx);
            entry.orders += 1;
        }

        let total: f64 = by_channel.values().map(|c| c.revenue).sum();
        let mut out: Vec<ChannelSales> = by_channel.into_values().collect();
        for channel in &mut out {
            channel.share_pct = if total > 0.0 {
                channel.revenue / total * 100.0
            } else {
                0.0
            };
        }
        out.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
        out
    }

    pub fn daily_sales(&self, range: Option<&DateRange>) -> Vec<DailySales> {
        let mut by_day: BTreeMap<NaiveDate, DailySales> = BTreeMap::new();
        for tx in self.sales(range) {
            let Some(date) = tx.date else { continue };
            let day = by_day.entry(date).or_insert(DailySales {
                date,
                units: 0,
                revenue: 0.0,
            });
            day.units += tx.quantity.abs();
            day.revenue += self.revenue(tx);
        }
        by_day.into_values().collect()
    }

    pub fn sales_by_sku(&self, range: Option<&DateRange>) -> Vec<SkuSales> {
        let mut out: Vec<SkuSales> = self
            .items
            .iter()
            .map(|item| {
                let sales: Vec<&Transaction> = self
                    .sales(range)
                    .into_iter()
                    .filter(|t| t.sku == item.product.sku)
                    .collect();
                SkuSales {
                    sku: item.product.sku.clone(),
                    name: item.product.display_name(),
                    units: sales.iter().map(|t| t.quantity.abs()).sum(),
                    revenue: sales.iter().map(|t| self.revenue(t)).sum(),
                }
            })
            .collect();
        out.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
        out
    }

    /// Units sold per day over the range.
    pub fn velocity(&self, sku: &str, range: &DateRange) -> f64 {
        let units: i64 = self
            .sales(Some(range))
            .iter()
            .filter(|t| t.sku == sku)
            .map(|t| t.quantity.abs())
            .sum();
        units as f64 / range.days().max(1) as f64
    }

    /// `sales / average(opening, current)` per SKU over `period_days`.
    pub fn turnover(&self, period_days: i64) -> Vec<TurnoverLine> {
        self.items
            .iter()
            .map(|item| {
                let average_inventory = (item.opening + item.current_stock) as f64 / 2.0;
                let ratio = if average_inventory > 0.0 {
                    item.sales as f64 / average_inventory
                } else {
                    0.0
                };
                TurnoverLine {
                    sku: item.product.sku.clone(),
                    sales: item.sales,
                    average_inventory,
                    ratio,
                    days_to_sell: (ratio > 0.0).then(|| period_days as f64 / ratio),
                }
            })
            .collect()
    }

    /// A up to 80 % cumulative revenue, B up to 95 %, C for the rest.
    pub fn abc_analysis(&self, range: Option<&DateRange>) -> Vec<AbcLine> {
        let by_sku = self.sales_by_sku(range);
        let total: f64 = by_sku.iter().map(|s| s.revenue).sum();

        let mut cumulative = 0.0;
        by_sku
            .into_iter()
            .enumerate()
            .map(|(idx, sales)| {
                cumulative += sales.revenue;
                let (share_pct, cumulative_pct) = if total > 0.0 {
                    (sales.revenue / total * 100.0, cumulative / total * 100.0)
                } else {
                    (0.0, 0.0)
                };
                let class = if total <= 0.0 {
                    AbcClass::C
                } else if cumulative_pct <= 80.0 + 1e-9 {
                    AbcClass::A
                } else if cumulative_pct <= 95.0 + 1e-9 {
                    AbcClass::B
                } else {
                    AbcClass::C
                };
                AbcLine {
                    rank: idx + 1,
                    sku: sales.sku,
                    name: sales.name,
                    revenue: sales.revenue,
                    share_pct,
                    cumulative_pct,
                    class,
                }
            })
            .collect()
    }

    /// `z * sqrt(lead_time) * σ(daily demand)`, floored at the low-stock threshold.
    pub fn safety_stock(&self, sku: &str, service_level: f64, range: Option<&DateRange>) -> f64 {
        let floor = self.thresholds.low_stock as f64;
        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for tx in self.sales(range).into_iter().filter(|t| t.sku == sku) {
            if let Some(date) = tx.date {
                *daily.entry(date).or_default() += tx.quantity.abs() as f64;
            }
        }
        if daily.len() < 2 {
            return floor;
        }

        let n = daily.len() as f64;
        let mean = daily.values().sum::<f64>() / n;
        let variance = daily.values().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let safety = z_score(service_level) * LEAD_TIME_DAYS.sqrt() * variance.sqrt();
        safety.max(floor)
    }
}

pub fn packaging_summary(snapshot: &InventorySnapshot, catalog: &ProductCatalog) -> PackagingSummary {
    let materials = snapshot
        .packaging
        .iter()
        .map(|row| MaterialLine {
            material: row.material.clone(),
            opening: row.opening,
            received: row.received,
            used: row.used,
            closing: row.closing(),
            recorded_closing: row.recorded_closing,
        })
        .collect();

    let mut pouch_usage: BTreeMap<String, i64> = BTreeMap::new();
    for row in &snapshot.packing {
        if let Some(product) = catalog.get(&row.sku) {
            *pouch_usage.entry(product.pouch_size.clone()).or_default() += row.quantity;
        }
    }

    let mut cartons: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for row in &snapshot.cartons {
        let entry = cartons.entry(row.sku.clone()).or_default();
        entry.0 += row.cartons;
        entry.1 += row.units();
    }

    PackagingSummary {
        materials,
        pouch_usage: pouch_usage.into_iter().collect(),
        carton_units: cartons.into_iter().map(|(sku, (c, u))| (sku, c, u)).collect(),
        raw_material_kg: snapshot.raw_materials.iter().map(|m| m.quantity_kg).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::model::PackingRow;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn setup() -> (ProductCatalog, ThresholdConfig) {
        let config = AppConfig::with_defaults();
        (ProductCatalog::from_config(&config), config.thresholds)
    }

    fn sale(sku: &str, quantity: i64, day: u32, channel: SalesChannel) -> Transaction {
        let mut tx = Transaction::new(TransactionKind::Sale, sku, quantity);
        tx.date = Some(date(day));
        tx.channel = Some(channel);
        tx
    }

    fn stock_row(sku: &str, opening: i64) -> StockRow {
        StockRow {
            sku: sku.to_string(),
            opening,
            ..StockRow::default()
        }
    }

    #[test]
    fn test_last_days_window() {
        let range = DateRange::last_days(date(15), 7);
        assert_eq!(range.start, date(9));
        assert_eq!(range.days(), 7);

        assert_eq!(DateRange::last_days(date(15), 0).days(), 1);

        let huge = DateRange::last_days(date(15), 200_000_000);
        assert_eq!(huge.start, NaiveDate::MIN);
        assert_eq!(huge.end, date(15));
        assert!(DateRange::last_days(date(15), i64::MAX).contains(date(1)));
    }

    #[test]
    fn test_current_stock_is_opening_plus_signed_movements() {
        let (catalog, thresholds) = setup();
        let mut row = stock_row("RC_0.5KG", 100);
        row.purchases = 20;
        row.sales = vec![(SalesChannel::AmazonFba, 30)];
        let mut adjustment = Transaction::new(TransactionKind::Adjustment, "RC_0.5KG", -4);
        adjustment.date = Some(date(3));
        let txs = vec![sale("RC_0.5KG", 6, 2, SalesChannel::Flipkart), adjustment];

        let ledger = Ledger::build(&catalog, &[row], &txs, &thresholds);
        let item = ledger.item("RC_0.5KG").unwrap();

        assert_eq!(item.current_stock, 100 + 20 - 30 - 6 - 4);
        assert_eq!(item.sales, 36);
        assert_eq!(item.adjustments, -4);
        assert_eq!(item.status, StockStatus::Normal);

        let movements = ledger.movements("RC_0.5KG");
        assert_eq!(movements.first().unwrap().kind, TransactionKind::Opening);
        assert_eq!(movements.last().unwrap().balance, item.current_stock);
    }

    #[test]
    fn test_products_without_rows_are_out_of_stock() {
        let (catalog, thresholds) = setup();
        let ledger = Ledger::build(&catalog, &[stock_row("RC_1.0KG", 8)], &[], &thresholds);

        let summary = ledger.summary();
        assert_eq!(summary.product_count, 5);
        assert_eq!(summary.count(StockStatus::OutOfStock), 4);
        assert_eq!(summary.count(StockStatus::Low), 1);
        assert_eq!(summary.reorder_needed, 5);
        assert_eq!(summary.total_units, 8);
        assert!((summary.total_value - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_reorder_sorted_by_urgency() {
        let (catalog, thresholds) = setup();
        let rows = vec![
            stock_row("RC_0.2KG", 8),
            stock_row("RC_0.5KG", 3),
            stock_row("RC_1.0KG", 500),
            stock_row("RC_1.5KG", 0),
            stock_row("RC_2.0KG", 1200),
        ];
        let ledger = Ledger::build(&catalog, &rows, &[], &thresholds);

        let recs = ledger.reorder_recommendations();
        let order: Vec<(&str, Urgency)> = recs.iter().map(|r| (r.sku.as_str(), r.urgency)).collect();
        assert_eq!(
            order,
            vec![
                ("RC_1.5KG", Urgency::Emergency),
                ("RC_0.5KG", Urgency::Critical),
                ("RC_0.2KG", Urgency::High),
            ]
        );
        assert_eq!(recs[1].quantity, 997);
        assert_eq!(ledger.item("RC_2.0KG").unwrap().status, StockStatus::Overstocked);
    }

    #[test]
    fn test_weighted_average_valuation() {
        let (catalog, thresholds) = setup();
        let mut purchase = Transaction::new(TransactionKind::Purchase, "RC_1.0KG", 10);
        purchase.unit_price = Some(70.0);
        let ledger = Ledger::build(&catalog, &[stock_row("RC_1.0KG", 10)], &[purchase], &thresholds);

        let current = ledger.valuation(ValuationMethod::Current);
        let average = ledger.valuation(ValuationMethod::WeightedAverage);

        assert!((current.total - 2000.0).abs() < 1e-9);
        assert!((average.total - 1700.0).abs() < 1e-9);
        let line = average.lines.iter().find(|l| l.sku == "RC_1.0KG").unwrap();
        assert!((line.share_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_stock_take_variance() {
        let (catalog, thresholds) = setup();
        let ledger = Ledger::build(
            &catalog,
            &[stock_row("RC_0.2KG", 50), stock_row("RC_0.5KG", 0)],
            &[],
            &thresholds,
        );
        let counts = HashMap::from([
            ("RC_0.2KG".to_string(), 45),
            ("RC_0.5KG".to_string(), 2),
        ]);

        let lines = ledger.stock_take(&counts);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].variance, -5);
        assert!((lines[0].variance_pct + 10.0).abs() < 1e-9);
        assert!((lines[1].variance_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sales_analytics_respect_range() {
        let (catalog, thresholds) = setup();
        let mut priced = sale("RC_0.5KG", 4, 1, SalesChannel::AmazonFba);
        priced.amount = Some(220.0);
        let txs = vec![
            priced,
            sale("RC_0.5KG", 2, 5, SalesChannel::Flipkart),
            sale("RC_2.0KG", 1, 20, SalesChannel::AmazonFba),
        ];
        let ledger = Ledger::build(&catalog, &[stock_row("RC_0.5KG", 100)], &txs, &thresholds);
        let range = DateRange::new(date(1), date(10));

        let channels = ledger.sales_by_channel(Some(&range));
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel, Some(SalesChannel::AmazonFba));
        assert!((channels[0].revenue - 220.0).abs() < 1e-9);
        assert!((channels[1].revenue - 100.0).abs() < 1e-9);

        let daily = ledger.daily_sales(Some(&range));
        assert_eq!(daily.iter().map(|d| d.units).collect::<Vec<_>>(), vec![4, 2]);
        assert!((ledger.velocity("RC_0.5KG", &range) - 0.6).abs() < 1e-9);
        assert_eq!(ledger.sales(None).len(), 3);
    }

    #[test]
    fn test_abc_classes() {
        let (catalog, thresholds) = setup();
        let mut txs = Vec::new();
        for (sku, amount) in [("RC_2.0KG", 800.0), ("RC_1.0KG", 150.0), ("RC_0.5KG", 50.0)] {
            let mut tx = sale(sku, 1, 1, SalesChannel::Others);
            tx.amount = Some(amount);
            txs.push(tx);
        }
        let ledger = Ledger::build(&catalog, &[], &txs, &thresholds);

        let abc = ledger.abc_analysis(None);
        let classes: Vec<(&str, AbcClass)> = abc.iter().map(|l| (l.sku.as_str(), l.class)).collect();
        assert_eq!(
            &classes[..3],
            &[
                ("RC_2.0KG", AbcClass::A),
                ("RC_1.0KG", AbcClass::B),
                ("RC_0.5KG", AbcClass::C)
            ]
        );
        assert_eq!(abc[0].rank, 1);
    }

    #[test]
    fn test_safety_stock_and_turnover() {
        let (catalog, thresholds) = setup();
        let txs: Vec<Transaction> = [10, 30, 10, 30]
            .iter()
            .enumerate()
            .map(|(i, q)| sale("RC_1.0KG", *q, i as u32 + 1, SalesChannel::Others))
            .collect();
        let ledger = Ledger::build(&catalog, &[stock_row("RC_1.0KG", 200)], &txs, &thresholds);

        // σ of [10, 30, 10, 30] with n-1 is 11.547
        let expected = 1.65 * 7f64.sqrt() * 11.547005383792516;
        assert!((ledger.safety_stock("RC_1.0KG", 0.95, None) - expected).abs() < 1e-6);
        assert_eq!(ledger.safety_stock("RC_0.2KG", 0.95, None), 10.0);

        let turnover = ledger.turnover(30);
        let line = turnover.iter().find(|t| t.sku == "RC_1.0KG").unwrap();
        assert_eq!(line.sales, 80);
        assert!((line.average_inventory - 160.0).abs() < 1e-9);
        assert!((line.ratio - 0.5).abs() < 1e-9);
        assert_eq!(line.days_to_sell, Some(60.0));
    }

    #[test]
    fn test_packaging_summary() {
        let (catalog, _) = setup();
        let snapshot = InventorySnapshot {
            packing: vec![
                PackingRow { date: None, sku: "RC_1.5KG".to_string(), quantity: 10 },
                PackingRow { date: None, sku: "RC_2.0KG".to_string(), quantity: 5 },
            ],
            ..InventorySnapshot::default()
        };
        let summary = packaging_summary(&snapshot, &catalog);
        assert_eq!(summary.pouch_usage, vec![("11*16".to_string(), 15)]);
    }
}
