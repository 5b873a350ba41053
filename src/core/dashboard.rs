use crate::config::AppConfig;
use crate::core::ledger::{ChannelSales, DailySales, DateRange, Ledger};
use crate::domain::model::{InventorySnapshot, ProductCatalog, StockStatus, TransactionKind};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Kpis {
    pub total_products: usize,
    pub total_units: i64,
    pub total_value: f64,
    pub low_stock_items: usize,
    pub out_of_stock_items: usize,
    pub sales_units: i64,
    pub sales_revenue: f64,
    pub range: DateRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockPoint {
    pub sku: String,
    pub label: String,
    pub current_stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub sku: String,
    pub name: String,
    pub status: StockStatus,
    pub current_stock: i64,
    pub min_stock: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub channel: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueShare {
    pub sku: String,
    pub name: String,
    pub value: f64,
    pub share_pct: f64,
}

/// Everything the dashboard page and the JSON API show.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub kpis: Kpis,
    pub stock_levels: Vec<StockPoint>,
    pub channels: Vec<ChannelSales>,
    pub daily_trend: Vec<DailySales>,
    pub alerts: Vec<Alert>,
    pub recent_activity: Vec<Activity>,
    pub value_breakdown: Vec<ValueShare>,
    pub warnings: Vec<String>,
}

impl Dashboard {
    pub fn build(
        ledger: &Ledger,
        snapshot: &InventorySnapshot,
        catalog: &ProductCatalog,
        config: &AppConfig,
        today: NaiveDate,
    ) -> Self {
        let range = DateRange::last_days(today, config.dashboard.date_range_days);
        let summary = ledger.summary();
        let daily_trend = ledger.daily_sales(Some(&range));

        let kpis = Kpis {
            total_products: summary.product_count,
            total_units: summary.total_units,
            total_value: summary.total_value,
            low_stock_items: summary.reorder_needed,
            out_of_stock_items: summary.count(StockStatus::OutOfStock),
            sales_units: daily_trend.iter().map(|d| d.units).sum(),
            sales_revenue: daily_trend.iter().map(|d| d.revenue).sum(),
            range,
        };

        let stock_levels = ledger
            .items()
            .iter()
            .map(|item| StockPoint {
                sku: item.product.sku.clone(),
                label: item.product.display_label(),
                current_stock: item.current_stock,
                min_stock: item.min_stock,
                max_stock: item.max_stock,
                status: item.status,
            })
            .collect();

        Self {
            kpis,
            stock_levels,
            channels: ledger.sales_by_channel(Some(&range)),
            daily_trend,
            alerts: alerts(ledger),
            recent_activity: recent_activity(ledger, catalog, config.dashboard.recent_activity),
            value_breakdown: value_breakdown(ledger),
            warnings: snapshot.warnings.clone(),
        }
    }
}

/// Every item whose status is not Normal, worst first.
pub fn alerts(ledger: &Ledger) -> Vec<Alert> {
    let mut out: Vec<Alert> = ledger
        .items()
        .iter()
        .filter(|item| item.status != StockStatus::Normal)
        .map(|item| {
            let message = match item.status {
                StockStatus::OutOfStock => "Out of stock, reorder immediately".to_string(),
                StockStatus::Critical => format!("Only {} units left", item.current_stock),
                StockStatus::Low => format!(
                    "Below minimum of {} units, reorder {}",
                    item.min_stock,
                    item.reorder_quantity()
                ),
                _ => format!("Above maximum of {} units", item.max_stock),
            };
            Alert {
                sku: item.product.sku.clone(),
                name: item.product.display_name(),
                status: item.status,
                current_stock: item.current_stock,
                min_stock: item.min_stock,
                message,
            }
        })
        .collect();
    out.sort_by_key(|a| (a.status, a.current_stock));
    out
}

/// Latest dated movements; among same-day entries, the one recorded last comes first.
pub fn recent_activity(ledger: &Ledger, catalog: &ProductCatalog, limit: usize) -> Vec<Activity> {
    let mut dated: Vec<Activity> = ledger
        .transactions()
        .iter()
        .rev()
        .filter_map(|tx| {
            Some(Activity {
                date: tx.date?,
                kind: tx.kind,
                sku: tx.sku.clone(),
                name: catalog
                    .get(&tx.sku)
                    .map(|p| p.display_name())
                    .unwrap_or_else(|| tx.sku.clone()),
                quantity: tx.signed_quantity(),
                channel: tx.channel.map(|c| c.name().to_string()),
                reference: tx.reference.clone(),
            })
        })
        .collect();
    dated.sort_by(|a, b| b.date.cmp(&a.date));
    dated.truncate(limit);
    dated
}

pub fn value_breakdown(ledger: &Ledger) -> Vec<ValueShare> {
    let total: f64 = ledger.items().iter().map(|i| i.stock_value()).sum();
    let mut out: Vec<ValueShare> = ledger
        .items()
        .iter()
        .map(|item| {
            let value = item.stock_value();
            ValueShare {
                sku: item.product.sku.clone(),
                name: item.product.display_name(),
                value,
                share_pct: if total > 0.0 { value / total * 100.0 } else { 0.0 },
            }
        })
        .collect();
    out.sort_by(|a, b| b.value.total_cmp(&a.value));
    out
}
