use crate::config::AppConfig;
use crate::core::backup::BackupService;
use crate::core::ledger::Ledger;
use crate::core::sheets::{
    self, ADJUSTMENT_LOG_HEADERS, PURCHASE_LOG_HEADERS, RETURN_LOG_HEADERS, SALES_LOG_HEADERS,
    STOCK_HEADERS,
};
use crate::core::workbook::{parse_text_date, Cell, Workbook};
use crate::domain::model::{Product, ProductCatalog, SalesChannel};
use crate::domain::ports::Storage;
use crate::utils::error::{InventoryError, Result};
use crate::utils::validation::{self, Validate};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Everything a form needs to be checked against.
pub struct EntryContext<'a> {
    pub config: &'a AppConfig,
    pub catalog: &'a ProductCatalog,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Opening,
    Sale,
    Purchase,
    Production,
    Return,
    Adjustment,
}

impl EntryKind {
    pub const ALL: [EntryKind; 6] = [
        EntryKind::Opening,
        EntryKind::Sale,
        EntryKind::Purchase,
        EntryKind::Production,
        EntryKind::Return,
        EntryKind::Adjustment,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Sale => "sale",
            Self::Purchase => "purchase",
            Self::Production => "production",
            Self::Return => "return",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Opening => "Opening Stock",
            Self::Sale => "Sales Entry",
            Self::Purchase => "Purchase Entry",
            Self::Production => "Production Entry",
            Self::Return => "Return Entry",
            Self::Adjustment => "Stock Adjustment",
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.slug() == wanted || format!("{}s", k.slug()) == wanted)
            .ok_or_else(|| format!("unknown entry type '{}'", s))
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpeningStockEntry {
    pub date: Option<NaiveDate>,
    pub product: String,
    pub quantity: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SaleEntry {
    pub date: Option<NaiveDate>,
    pub product: String,
    pub channel: String,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub total_amount: Option<f64>,
    pub order_id: Option<String>,
    pub customer: Option<String>,
    pub notes: Option<String>,
}

/// Finished goods when `product` is set, otherwise raw material by weight.
#[derive(Debug, Clone, Default)]
pub struct PurchaseEntry {
    pub date: Option<NaiveDate>,
    pub supplier: String,
    pub material_type: Option<String>,
    pub product: Option<String>,
    pub quantity: Option<i64>,
    pub quantity_kg: Option<f64>,
    pub rate: Option<f64>,
    pub total_amount: Option<f64>,
    pub invoice_number: Option<String>,
    pub quality_grade: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductionEntry {
    pub date: Option<NaiveDate>,
    pub batch_number: String,
    pub raw_material_used_kg: Option<f64>,
    /// (product text, units)
    pub outputs: Vec<(String, i64)>,
    pub operator: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReturnEntry {
    pub date: Option<NaiveDate>,
    pub product: String,
    pub channel: Option<String>,
    pub quantity: Option<i64>,
    pub reason: String,
    pub order_id: Option<String>,
    pub condition: Option<String>,
    pub notes: Option<String>,
}

/// `quantity` is signed: negative removes stock.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentEntry {
    pub date: Option<NaiveDate>,
    pub product: String,
    pub quantity: Option<i64>,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Entry {
    Opening(OpeningStockEntry),
    Sale(SaleEntry),
    Purchase(PurchaseEntry),
    Production(ProductionEntry),
    Return(ReturnEntry),
    Adjustment(AdjustmentEntry),
}

/// Submitted form fields, blank values dropped.
#[derive(Debug, Clone, Default)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self(fields)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.text(key).and_then(|v| v.replace(',', "").parse().ok())
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.text(key).and_then(|v| v.replace(',', "").parse().ok())
    }

    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        self.text(key).and_then(|v| parse_text_date(&v))
    }
}

impl From<HashMap<String, String>> for FormFields {
    fn from(fields: HashMap<String, String>) -> Self {
        Self::new(fields)
    }
}

pub const OUTPUT_FIELD_PREFIX: &str = "output_";

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Opening(_) => EntryKind::Opening,
            Self::Sale(_) => EntryKind::Sale,
            Self::Purchase(_) => EntryKind::Purchase,
            Self::Production(_) => EntryKind::Production,
            Self::Return(_) => EntryKind::Return,
            Self::Adjustment(_) => EntryKind::Adjustment,
        }
    }

    pub fn from_form(kind: EntryKind, form: &FormFields) -> Self {
        let text = |key: &str| form.text(key).unwrap_or_default();
        match kind {
            EntryKind::Opening => Self::Opening(OpeningStockEntry {
                date: form.date("date"),
                product: text("product"),
                quantity: form.int("quantity"),
                notes: form.text("notes"),
            }),
            EntryKind::Sale => Self::Sale(SaleEntry {
                date: form.date("date"),
                product: text("product"),
                channel: text("channel"),
                quantity: form.int("quantity"),
                unit_price: form.float("unit_price"),
                total_amount: form.float("total_amount"),
                order_id: form.text("order_id"),
                customer: form.text("customer"),
                notes: form.text("notes"),
            }),
            EntryKind::Purchase => Self::Purchase(PurchaseEntry {
                date: form.date("date"),
                supplier: text("supplier"),
                material_type: form.text("material_type"),
                product: form.text("product"),
                quantity: form.int("quantity"),
                quantity_kg: form.float("quantity_kg"),
                rate: form.float("rate"),
                total_amount: form.float("total_amount"),
                invoice_number: form.text("invoice_number"),
                quality_grade: form.text("quality_grade"),
                payment_method: form.text("payment_method"),
                notes: form.text("notes"),
            }),
            EntryKind::Production => {
                let mut outputs: Vec<(String, i64)> = form
                    .0
                    .keys()
                    .filter_map(|key| {
                        let product = key.strip_prefix(OUTPUT_FIELD_PREFIX)?;
                        Some((product.to_string(), form.int(key).unwrap_or(0)))
                    })
                    .collect();
                outputs.sort();
                Self::Production(ProductionEntry {
                    date: form.date("date"),
                    batch_number: text("batch_number"),
                    raw_material_used_kg: form.float("raw_material_used_kg"),
                    outputs,
                    operator: form.text("operator"),
                    notes: form.text("notes"),
                })
            }
            EntryKind::Return => Self::Return(ReturnEntry {
                date: form.date("date"),
                product: text("product"),
                channel: form.text("channel"),
                quantity: form.int("quantity"),
                reason: text("reason"),
                order_id: form.text("order_id"),
                condition: form.text("condition"),
                notes: form.text("notes"),
            }),
            EntryKind::Adjustment => Self::Adjustment(AdjustmentEntry {
                date: form.date("date"),
                product: text("product"),
                quantity: form.int("quantity"),
                reason: text("reason"),
                notes: form.text("notes"),
            }),
        }
    }

    /// Every problem with the entry, one message per field rule.
    pub fn field_errors(&self, ctx: &EntryContext) -> Vec<String> {
        let mut errors = Vec::new();
        let max_quantity = ctx.config.thresholds.max_quantity;
        let max_price = ctx.config.thresholds.max_price;

        match self {
            Self::Opening(e) => {
                check_date(&mut errors, e.date, ctx.today);
                check_product(&mut errors, ctx, &e.product);
                match e.quantity {
                    Some(q) if (0..=max_quantity).contains(&q) => {}
                    _ => errors.push(format!("Quantity must be between 0 and {}", max_quantity)),
                }
            }
            Self::Sale(e) => {
                check_date(&mut errors, e.date, ctx.today);
                check_product(&mut errors, ctx, &e.product);
                check_channel(&mut errors, ctx, &e.channel);
                check_quantity(&mut errors, "Quantity", e.quantity, max_quantity);
                check_price(&mut errors, "Unit price", e.unit_price, max_price);
                if let (Some(q), Some(p)) = (e.quantity, e.unit_price) {
                    check_total(&mut errors, e.total_amount, q as f64 * p);
                }
                if let Some(order_id) = &e.order_id {
                    if !validation::is_valid_order_id(order_id) {
                        errors.push("Order ID must be 5-20 letters, digits or dashes".to_string());
                    }
                }
            }
            Self::Purchase(e) => {
                check_date(&mut errors, e.date, ctx.today);
                if e.supplier.trim().chars().count() < 2 {
                    errors.push("Supplier name must be at least 2 characters".to_string());
                }
                let amount = match &e.product {
                    Some(product) => {
                        check_product(&mut errors, ctx, product);
                        check_quantity(&mut errors, "Quantity", e.quantity, max_quantity);
                        e.quantity.map(|q| q as f64)
                    }
                    None => match e.quantity_kg {
                        Some(kg) if kg > 0.0 && kg <= max_quantity as f64 => Some(kg),
                        _ => {
                            errors.push(format!(
                                "Quantity (kg) must be greater than 0 and at most {}",
                                max_quantity
                            ));
                            None
                        }
                    },
                };
                check_price(&mut errors, "Rate", e.rate, max_price);
                if let (Some(units), Some(rate)) = (amount, e.rate) {
                    check_total(&mut errors, e.total_amount, units * rate);
                }
                if let Some(invoice) = &e.invoice_number {
                    if !validation::is_valid_invoice_number(invoice) {
                        errors.push(
                            "Invoice number must be 3-20 letters, digits, dashes or slashes".to_string(),
                        );
                    }
                }
            }
            Self::Production(e) => {
                check_date(&mut errors, e.date, ctx.today);
                if e.batch_number.trim().is_empty() {
                    errors.push("Batch number is required".to_string());
                } else if !validation::is_valid_batch_number(e.batch_number.trim()) {
                    errors.push("Batch number must look like BATCH-YYYYMMDD-NNN".to_string());
                }
                if !e.outputs.iter().any(|(_, q)| *q > 0) {
                    errors.push("At least one production output must be greater than 0".to_string());
                }
                let mut seen = HashSet::new();
                for (product, quantity) in e.outputs.iter().filter(|(_, q)| *q != 0) {
                    check_product(&mut errors, ctx, product);
                    if let Some(resolved) = ctx.catalog.resolve(product) {
                        // 同一產品只能有一個輸出欄位
                        if !seen.insert(resolved.fnsku.as_str()) {
                            errors.push(format!(
                                "{} is listed more than once in the production outputs",
                                resolved.display_name()
                            ));
                        }
                    }
                    if *quantity < 0 || *quantity > max_quantity {
                        errors.push(format!(
                            "Output for {} must be between 0 and {}",
                            product, max_quantity
                        ));
                    }
                }
                match e.raw_material_used_kg {
                    Some(kg) if kg <= 0.0 => {
                        errors.push("Raw material used must be greater than 0".to_string())
                    }
                    Some(_) => {
                        if let Some(efficiency) = e.efficiency(ctx.catalog) {
                            if !(0.0..=200.0).contains(&efficiency) {
                                errors.push(format!(
                                    "Efficiency {:.1}% must be between 0% and 200%",
                                    efficiency
                                ));
                            }
                        }
                    }
                    None => {}
                }
            }
            Self::Return(e) => {
                check_date(&mut errors, e.date, ctx.today);
                check_product(&mut errors, ctx, &e.product);
                check_quantity(&mut errors, "Quantity", e.quantity, max_quantity);
                if let Some(channel) = &e.channel {
                    check_channel(&mut errors, ctx, channel);
                }
                if e.reason.trim().is_empty() {
                    errors.push("Reason is required".to_string());
                }
                if let Some(order_id) = &e.order_id {
                    if !validation::is_valid_order_id(order_id) {
                        errors.push("Order ID must be 5-20 letters, digits or dashes".to_string());
                    }
                }
            }
            Self::Adjustment(e) => {
                check_date(&mut errors, e.date, ctx.today);
                check_product(&mut errors, ctx, &e.product);
                match e.quantity {
                    Some(q) if q != 0 && q.abs() <= max_quantity => {}
                    _ => errors.push(format!(
                        "Adjustment must be non-zero and at most {} units either way",
                        max_quantity
                    )),
                }
                if e.reason.trim().is_empty() {
                    errors.push("Reason is required".to_string());
                }
            }
        }
        errors
    }

    /// Writes the entry into the workbook; returns the sheet and 0-based data row touched.
    pub fn apply(&self, workbook: &mut Workbook, ctx: &EntryContext) -> Result<(String, usize)> {
        let names = &ctx.config.sheets;
        let product = |text: &str| resolve_product(ctx.catalog, text);

        match self {
            Self::Opening(e) => {
                let product = product(&e.product)?;
                let quantity = Cell::from(e.quantity.unwrap_or(0));
                let stock = workbook.ensure_sheet(&names.stock, STOCK_HEADERS);
                let existing = (0..stock.len()).find(|row| {
                    ["product_name", "sku", "fnsku", "weight"].iter().any(|key| {
                        stock
                            .text(*row, key)
                            .and_then(|t| ctx.catalog.resolve(&t))
                            .is_some_and(|p| p.sku == product.sku)
                    })
                });
                let row = match existing {
                    Some(row) => {
                        stock.set(row, "Opening Stock", quantity)?;
                        row
                    }
                    None => stock.append_record(&[
                        ("Product", Cell::text(product.display_name())),
                        ("Opening Stock", quantity),
                    ]),
                };
                Ok((stock.name.clone(), row))
            }
            Self::Sale(e) => {
                let product = product(&e.product)?;
                let quantity = e.quantity.unwrap_or(0);
                let price = e.unit_price.unwrap_or(product.unit_price);
                let channel = SalesChannel::from_name(&e.channel)
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| e.channel.trim().to_string());
                let table = workbook.ensure_sheet(&names.sales_log, SALES_LOG_HEADERS);
                let row = table.append_record(&[
                    ("Date", Cell::from(e.date)),
                    ("Product", Cell::text(product.display_name())),
                    ("Channel", Cell::text(channel)),
                    ("Quantity", Cell::from(quantity)),
                    ("Unit Price", Cell::from(price)),
                    ("Total Amount", Cell::from(e.total_amount.unwrap_or(quantity as f64 * price))),
                    ("Order ID", Cell::from(e.order_id.clone())),
                    ("Customer", Cell::from(e.customer.clone())),
                    ("Notes", Cell::from(e.notes.clone())),
                ]);
                Ok((table.name.clone(), row))
            }
            Self::Purchase(e) => {
                let product_label = match &e.product {
                    Some(text) => Some(product(text)?.display_name()),
                    None => None,
                };
                let units = e
                    .product
                    .as_ref()
                    .and(e.quantity.map(|q| q as f64))
                    .or(e.quantity_kg)
                    .unwrap_or(0.0);
                let total = e
                    .total_amount
                    .unwrap_or(units * e.rate.unwrap_or(0.0));
                let table = workbook.ensure_sheet(&names.purchase_log, PURCHASE_LOG_HEADERS);
                let row = table.append_record(&[
                    ("Date", Cell::from(e.date)),
                    ("Supplier", Cell::text(e.supplier.trim())),
                    ("Material Type", Cell::from(e.material_type.clone())),
                    ("Product", Cell::from(product_label)),
                    ("Quantity", Cell::from(e.product.as_ref().and(e.quantity))),
                    ("Quantity KG", Cell::from(e.quantity_kg)),
                    ("Rate", Cell::from(e.rate)),
                    ("Total Amount", Cell::from(total)),
                    ("Invoice Number", Cell::from(e.invoice_number.clone())),
                    ("Quality Grade", Cell::from(e.quality_grade.clone())),
                    ("Payment Method", Cell::from(e.payment_method.clone())),
                    ("Notes", Cell::from(e.notes.clone())),
                ]);
                Ok((table.name.clone(), row))
            }
            Self::Production(e) => {
                let headers = sheets::production_log_headers(ctx.catalog);
                let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
                let mut record: Vec<(String, Cell)> = vec![
                    ("Date".to_string(), Cell::from(e.date)),
                    ("Batch Number".to_string(), Cell::text(e.batch_number.trim())),
                    ("Raw Material Used KG".to_string(), Cell::from(e.raw_material_used_kg)),
                ];
                for (text, quantity) in e.outputs.iter().filter(|(_, q)| *q > 0) {
                    let product = product(text)?;
                    record.push((sheets::production_output_header(product), Cell::from(*quantity)));
                }
                record.push((
                    "Efficiency".to_string(),
                    Cell::from(e.efficiency(ctx.catalog).map(|v| (v * 10.0).round() / 10.0)),
                ));
                record.push(("Operator".to_string(), Cell::from(e.operator.clone())));
                record.push(("Notes".to_string(), Cell::from(e.notes.clone())));

                let record_refs: Vec<(&str, Cell)> =
                    record.iter().map(|(h, c)| (h.as_str(), c.clone())).collect();
                let table = workbook.ensure_sheet(&names.production_log, &header_refs);
                let row = table.append_record(&record_refs);
                Ok((table.name.clone(), row))
            }
            Self::Return(e) => {
                let product = product(&e.product)?;
                let table = workbook.ensure_sheet(&names.return_log, RETURN_LOG_HEADERS);
                let row = table.append_record(&[
                    ("Date", Cell::from(e.date)),
                    ("Product", Cell::text(product.display_name())),
                    ("Channel", Cell::from(e.channel.clone())),
                    ("Quantity", Cell::from(e.quantity.unwrap_or(0))),
                    ("Reason", Cell::text(e.reason.trim())),
                    ("Order ID", Cell::from(e.order_id.clone())),
                    ("Condition", Cell::from(e.condition.clone())),
                    ("Notes", Cell::from(e.notes.clone())),
                ]);
                Ok((table.name.clone(), row))
            }
            Self::Adjustment(e) => {
                let product = product(&e.product)?;
                let table = workbook.ensure_sheet(&names.adjustment_log, ADJUSTMENT_LOG_HEADERS);
                let row = table.append_record(&[
                    ("Date", Cell::from(e.date)),
                    ("Product", Cell::text(product.display_name())),
                    ("Quantity", Cell::from(e.quantity.unwrap_or(0))),
                    ("Reason", Cell::text(e.reason.trim())),
                    ("Notes", Cell::from(e.notes.clone())),
                ]);
                Ok((table.name.clone(), row))
            }
        }
    }

    /// Stock leaving the shelf, for the over-sell warning.
    fn outflow(&self) -> Option<(&str, i64)> {
        match self {
            Self::Sale(e) => e.quantity.map(|q| (e.product.as_str(), q)),
            Self::Adjustment(e) => e.quantity.filter(|q| *q < 0).map(|q| (e.product.as_str(), -q)),
            _ => None,
        }
    }
}

impl ProductionEntry {
    /// Output weight over raw material weight, in percent.
    pub fn efficiency(&self, catalog: &ProductCatalog) -> Option<f64> {
        let raw = self.raw_material_used_kg.filter(|kg| *kg > 0.0)?;
        let output_kg: f64 = self
            .outputs
            .iter()
            .filter_map(|(text, q)| catalog.resolve(text).map(|p| p.weight_kg * *q as f64))
            .sum();
        Some(output_kg / raw * 100.0)
    }
}

fn resolve_product<'c>(catalog: &'c ProductCatalog, text: &str) -> Result<&'c Product> {
    catalog
        .resolve(text)
        .ok_or_else(|| InventoryError::not_found(format!("product '{}'", text)))
}

fn check_date(errors: &mut Vec<String>, date: Option<NaiveDate>, today: NaiveDate) {
    match date {
        None => errors.push("Date is required".to_string()),
        Some(d) if !validation::is_not_future(d, today) => {
            errors.push("Date cannot be in the future".to_string())
        }
        Some(_) => {}
    }
}

fn check_product(errors: &mut Vec<String>, ctx: &EntryContext, product: &str) {
    if product.trim().is_empty() {
        errors.push("Product is required".to_string());
    } else if ctx.catalog.resolve(product).is_none() {
        errors.push(format!("Product '{}' is not in the catalog", product.trim()));
    }
}

fn check_channel(errors: &mut Vec<String>, ctx: &EntryContext, channel: &str) {
    if channel.trim().is_empty() {
        errors.push("Channel is required".to_string());
    } else if !ctx.config.is_known_channel(channel) {
        errors.push(format!("Channel '{}' is not a configured sales channel", channel.trim()));
    }
}

fn check_quantity(errors: &mut Vec<String>, label: &str, quantity: Option<i64>, max: i64) {
    match quantity {
        Some(q) if q > 0 && q <= max => {}
        _ => errors.push(format!("{} must be between 1 and {}", label, max)),
    }
}

fn check_price(errors: &mut Vec<String>, label: &str, price: Option<f64>, max: f64) {
    match price {
        Some(p) if p > 0.0 && p <= max => {}
        _ => errors.push(format!("{} must be greater than 0 and at most {}", label, max)),
    }
}

fn check_total(errors: &mut Vec<String>, total: Option<f64>, expected: f64) {
    if let Some(total) = total {
        if (total - expected).abs() > 0.01 {
            errors.push(format!(
                "Total amount {:.2} does not match quantity x price {:.2}",
                total, expected
            ));
        }
    }
}

/// An entry paired with the context it is checked against.
pub struct Submission<'a> {
    pub entry: &'a Entry,
    pub ctx: &'a EntryContext<'a>,
}

impl Validate for Submission<'_> {
    fn validate(&self) -> Result<()> {
        let errors = self.entry.field_errors(self.ctx);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InventoryError::ValidationError { errors })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub kind: EntryKind,
    pub sheet: String,
    /// 1-based row in the spreadsheet.
    pub row: usize,
    pub warnings: Vec<String>,
    pub backup: Option<String>,
}

/// Validates entries and appends them to the workbook.
pub struct Recorder<'a, S: Storage> {
    storage: &'a S,
    config: &'a AppConfig,
    catalog: &'a ProductCatalog,
    backups: Option<&'a BackupService>,
}

impl<'a, S: Storage> Recorder<'a, S> {
    pub fn new(storage: &'a S, config: &'a AppConfig, catalog: &'a ProductCatalog) -> Self {
        Self {
            storage,
            config,
            catalog,
            backups: None,
        }
    }

    pub fn with_backups(mut self, backups: &'a BackupService) -> Self {
        self.backups = Some(backups);
        self
    }

    pub async fn record(&self, entry: &Entry, today: NaiveDate) -> Result<RecordOutcome> {
        let ctx = EntryContext {
            config: self.config,
            catalog: self.catalog,
            today,
        };
        Submission { entry, ctx: &ctx }.validate()?;

        let path = self.config.paths.workbook.to_string_lossy().to_string();
        let mut workbook = if self.storage.exists(&path).await {
            Workbook::load(self.storage, &path).await?
        } else {
            tracing::warn!("Workbook {} missing, starting from template", path);
            sheets::template_workbook(self.config, self.catalog)
        };

        let mut warnings = Vec::new();
        if let Some((text, quantity)) = entry.outflow() {
            if let Ok(snapshot) = sheets::parse_inventory(&workbook, self.config, self.catalog) {
                let ledger = Ledger::from_snapshot(self.catalog, &snapshot, &self.config.thresholds);
                let item = self
                    .catalog
                    .resolve(text)
                    .and_then(|p| ledger.item(&p.sku));
                if let Some(item) = item.filter(|i| quantity > i.current_stock) {
                    warnings.push(format!(
                        "{} units exceed current stock of {} for {}",
                        quantity,
                        item.current_stock,
                        item.product.display_name()
                    ));
                }
            }
        }

        let mut backup = None;
        if let Some(service) = self.backups.filter(|_| self.config.backup.auto_backup) {
            if self.storage.exists(&path).await {
                let info = service
                    .create_automatic(&format!("before {} entry", entry.kind()))
                    .await?;
                backup = Some(info.file_name);
            }
        }

        let (sheet, row) = entry.apply(&mut workbook, &ctx)?;
        workbook.save(self.storage, &path).await?;

        let row_number = workbook
            .sheet(&sheet)
            .map(|t| t.sheet_row_number(row))
            .unwrap_or(row + 2);
        tracing::info!(
            "📝 Recorded {} entry in '{}' row {}",
            entry.kind(),
            sheet,
            row_number
        );
        for warning in &warnings {
            tracing::warn!("⚠️ {}", warning);
        }

        Ok(RecordOutcome {
            kind: entry.kind(),
            sheet,
            row: row_number,
            warnings,
            backup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 8).unwrap()
    }

    fn check(entry: &Entry) -> Vec<String> {
        let config = AppConfig::with_defaults();
        let catalog = ProductCatalog::from_config(&config);
        let ctx = EntryContext {
            config: &config,
            catalog: &catalog,
            today: today(),
        };
        entry.field_errors(&ctx)
    }

    fn valid_sale() -> SaleEntry {
        SaleEntry {
            date: Some(today()),
            product: "0.5kg".to_string(),
            channel: "Amazon FBA".to_string(),
            quantity: Some(4),
            unit_price: Some(55.0),
            total_amount: Some(220.0),
            order_id: Some("408-1234567".to_string()),
            ..SaleEntry::default()
        }
    }

    #[test]
    fn test_valid_sale_has_no_errors() {
        assert!(check(&Entry::Sale(valid_sale())).is_empty());
    }

    #[test]
    fn test_sale_errors_are_listed_flat() {
        let entry = Entry::Sale(SaleEntry {
            date: today().succ_opt(),
            product: "3kg".to_string(),
            channel: "Meesho".to_string(),
            quantity: Some(0),
            unit_price: Some(55.0),
            total_amount: Some(10.0),
            order_id: Some("x".to_string()),
            ..SaleEntry::default()
        });
        let errors = check(&entry);
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors.contains(&"Date cannot be in the future".to_string()));
        assert!(errors.iter().any(|e| e.contains("'3kg'")));
        assert!(errors.iter().any(|e| e.contains("Meesho")));
    }

    #[test]
    fn test_total_must_match_within_a_paisa() {
        let mut sale = valid_sale();
        sale.total_amount = Some(220.009);
        assert!(check(&Entry::Sale(sale.clone())).is_empty());
        sale.total_amount = Some(220.02);
        assert_eq!(check(&Entry::Sale(sale)).len(), 1);
    }

    #[test]
    fn test_purchase_of_raw_material() {
        let entry = Entry::Purchase(PurchaseEntry {
            date: Some(today()),
            supplier: "S".to_string(),
            quantity_kg: Some(100.0),
            rate: Some(80.0),
            invoice_number: Some("INV/2025/7".to_string()),
            ..PurchaseEntry::default()
        });
        assert_eq!(check(&entry), vec!["Supplier name must be at least 2 characters"]);
    }

    #[test]
    fn test_production_rules() {
        let entry = Entry::Production(ProductionEntry {
            date: Some(today()),
            batch_number: "BATCH-20250608-001".to_string(),
            raw_material_used_kg: Some(10.0),
            outputs: vec![("RC_2.0KG".to_string(), 12)],
            ..ProductionEntry::default()
        });
        // 24kg out of 10kg raw is 240%
        let errors = check(&entry);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("240.0%"));

        let empty = Entry::Production(ProductionEntry {
            date: Some(today()),
            batch_number: "B1".to_string(),
            ..ProductionEntry::default()
        });
        assert_eq!(check(&empty).len(), 2);
    }

    #[test]
    fn test_production_rejects_same_product_twice() {
        let entry = Entry::Production(ProductionEntry {
            date: Some(today()),
            batch_number: "BATCH-20250608-003".to_string(),
            raw_material_used_kg: Some(50.0),
            outputs: vec![("RC_1.0KG".to_string(), 10), ("1.0kg".to_string(), 5)],
            ..ProductionEntry::default()
        });
        let errors = check(&entry);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("more than once"));
    }

    #[test]
    fn test_adjustment_and_return_need_reason() {
        let adjustment = Entry::Adjustment(AdjustmentEntry {
            date: Some(today()),
            product: "1.0kg".to_string(),
            quantity: Some(-3),
            ..AdjustmentEntry::default()
        });
        assert_eq!(check(&adjustment), vec!["Reason is required"]);

        let ret = Entry::Return(ReturnEntry {
            date: Some(today()),
            product: "1.0kg".to_string(),
            quantity: Some(1),
            reason: "Damaged".to_string(),
            channel: Some("Flipkart".to_string()),
            ..ReturnEntry::default()
        });
        assert!(check(&ret).is_empty());
    }

    #[test]
    fn test_form_fields_build_entries() {
        let fields: HashMap<String, String> = [
            ("date", "2025-06-08"),
            ("batch_number", "BATCH-20250608-002"),
            ("raw_material_used_kg", "50"),
            ("output_RC_0.5KG", "40"),
            ("output_RC_1.0KG", ""),
            ("notes", "  "),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let entry = Entry::from_form(EntryKind::Production, &FormFields::new(fields));
        let Entry::Production(production) = &entry else {
            panic!("expected production entry");
        };
        assert_eq!(production.outputs, vec![("RC_0.5KG".to_string(), 40), ("RC_1.0KG".to_string(), 0)]);
        assert!(production.notes.is_none());
        assert!(check(&entry).is_empty());
    }

    #[test]
    fn test_submission_validate_wraps_errors() {
        let config = AppConfig::with_defaults();
        let catalog = ProductCatalog::from_config(&config);
        let ctx = EntryContext {
            config: &config,
            catalog: &catalog,
            today: today(),
        };
        let entry = Entry::Opening(OpeningStockEntry::default());
        let err = Submission { entry: &entry, ctx: &ctx }.validate().unwrap_err();
        match err {
            InventoryError::ValidationError { errors } => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_entry_kind_parsing() {
        assert_eq!("sales".parse::<EntryKind>().unwrap(), EntryKind::Sale);
        assert_eq!("Opening".parse::<EntryKind>().unwrap(), EntryKind::Opening);
        assert!("transfer".parse::<EntryKind>().is_err());
    }
}
