use crate::config::AppConfig;
use crate::core::workbook::{Cell, Table, Workbook};
use crate::domain::model::{
    CartonRow, InventorySnapshot, PackagingRow, PackingRow, Product, ProductCatalog,
    RawMaterialMovement, SalesChannel, StockRow, Transaction, TransactionKind,
};
use crate::utils::error::{InventoryError, Result};
use std::collections::HashSet;

pub const STOCK_HEADERS: &[&str] = &[
    "Product",
    "Weight",
    "FNSKU",
    "Opening Stock",
    "Purchases",
    "Production",
    "FBA",
    "Easyship",
    "Flipkart",
    "Others",
    "Returns",
    "Closing Stock",
    "Min Stock",
    "Max Stock",
    "Unit Price",
];
pub const RETURN_HEADERS: &[&str] = &["Date", "Product", "Channel", "Quantity", "Reason", "Order ID"];
pub const PACKAGING_HEADERS: &[&str] = &["Material", "Opening Stock", "Received", "Used", "Closing Stock"];
pub const CARTON_HEADERS: &[&str] = &["Date", "Product", "Cartons", "Units Per Carton", "Destination"];
pub const PACKING_HEADERS: &[&str] = &["Date", "Product", "Quantity"];

pub const SALES_LOG_HEADERS: &[&str] = &[
    "Date",
    "Product",
    "Channel",
    "Quantity",
    "Unit Price",
    "Total Amount",
    "Order ID",
    "Customer",
    "Notes",
];
pub const PURCHASE_LOG_HEADERS: &[&str] = &[
    "Date",
    "Supplier",
    "Material Type",
    "Product",
    "Quantity",
    "Quantity KG",
    "Rate",
    "Total Amount",
    "Invoice Number",
    "Quality Grade",
    "Payment Method",
    "Notes",
];
pub const PRODUCTION_LOG_BASE_HEADERS: &[&str] =
    &["Date", "Batch Number", "Raw Material Used KG", "Efficiency", "Operator", "Notes"];
pub const RETURN_LOG_HEADERS: &[&str] = &[
    "Date", "Product", "Channel", "Quantity", "Reason", "Order ID", "Condition", "Notes",
];
pub const ADJUSTMENT_LOG_HEADERS: &[&str] = &["Date", "Product", "Quantity", "Reason", "Notes"];

pub const PRODUCT_KEYS: &[&str] = &["product_name", "sku", "fnsku", "weight"];
const TOTAL_ROW_LABELS: &[&str] = &["total", "grand total", "totals"];

/// `Output 0.5kg` style column for a product on the production log.
pub fn production_output_header(product: &Product) -> String {
    format!("Output {}", product.display_label())
}

pub fn production_log_headers(catalog: &ProductCatalog) -> Vec<String> {
    let mut headers: Vec<String> = PRODUCTION_LOG_BASE_HEADERS[..3]
        .iter()
        .map(|h| h.to_string())
        .collect();
    headers.extend(catalog.products().iter().map(production_output_header));
    headers.extend(PRODUCTION_LOG_BASE_HEADERS[3..].iter().map(|h| h.to_string()));
    headers
}

/// Resolves a row's product from the first product-like column that matches the catalog.
fn resolve_row<'a>(table: &Table, row: usize, catalog: &'a ProductCatalog) -> RowProduct<'a> {
    let mut label = None;
    for key in PRODUCT_KEYS {
        if let Some(text) = table.text(row, key) {
            if let Some(product) = catalog.resolve(&text) {
                return RowProduct::Known(product);
            }
            label.get_or_insert(text);
        }
    }
    match label {
        Some(text) if TOTAL_ROW_LABELS.contains(&text.to_lowercase().as_str()) => RowProduct::Total,
        Some(text) => RowProduct::Unknown(text),
        None => RowProduct::Blank,
    }
}

enum RowProduct<'a> {
    Known(&'a Product),
    Unknown(String),
    Total,
    Blank,
}

struct Parser<'a> {
    config: &'a AppConfig,
    catalog: &'a ProductCatalog,
    snapshot: InventorySnapshot,
}

impl<'a> Parser<'a> {
    fn warn(&mut self, message: String) {
        tracing::warn!("⚠️ {}", message);
        self.snapshot.warnings.push(message);
    }

    fn product_for(&mut self, table: &Table, row: usize) -> Option<&'a Product> {
        match resolve_row(table, row, self.catalog) {
            RowProduct::Known(product) => Some(product),
            RowProduct::Unknown(label) => {
                self.warn(format!(
                    "{} row {}: unknown product '{}'",
                    table.name,
                    table.sheet_row_number(row),
                    label
                ));
                None
            }
            RowProduct::Total | RowProduct::Blank => None,
        }
    }

    fn parse_stock_sheet(&mut self, table: &Table) -> Result<()> {
        if table.find_column(PRODUCT_KEYS).is_none() {
            return Err(InventoryError::workbook(format!(
                "Sheet '{}' has no product column (expected one of Product, SKU, FNSKU, Weight)",
                table.name
            )));
        }

        let channel_columns: Vec<(SalesChannel, &str)> = [
            (SalesChannel::AmazonFba, "fba"),
            (SalesChannel::AmazonEasyship, "easyship"),
            (SalesChannel::Flipkart, "flipkart"),
            (SalesChannel::Others, "others"),
        ]
        .into_iter()
        .filter(|(_, key)| table.has_column(key))
        .collect();

        let mut seen = HashSet::new();
        for row in 0..table.len() {
            let Some(product) = self.product_for(table, row) else {
                continue;
            };
            if !seen.insert(product.sku.clone()) {
                self.warn(format!(
                    "{} row {}: duplicate entry for {}, values are added",
                    table.name,
                    table.sheet_row_number(row),
                    product.sku
                ));
            }

            // 有通路欄位時以通路欄位為準，否則使用總銷售欄
            let sales = if channel_columns.is_empty() {
                vec![(SalesChannel::Others, table.int(row, "sales").unwrap_or(0))]
            } else {
                channel_columns
                    .iter()
                    .map(|(channel, key)| (*channel, table.int(row, key).unwrap_or(0)))
                    .collect()
            };

            self.snapshot.stock_rows.push(StockRow {
                sku: product.sku.clone(),
                label: table.text(row, "product_name").unwrap_or_else(|| product.display_label()),
                opening: table.int(row, "opening_stock").unwrap_or(0),
                purchases: table.int(row, "purchases").unwrap_or(0),
                production: table.int(row, "production").unwrap_or(0),
                sales,
                returns: table.int(row, "returns").unwrap_or(0),
                min_stock: table.int(row, "min_stock"),
                max_stock: table.int(row, "max_stock"),
                unit_price: table.float(row, "unit_price"),
                recorded_closing: table.int(row, "closing_stock"),
                row_number: table.sheet_row_number(row),
            });
        }
        Ok(())
    }

    fn parse_movement_sheet(&mut self, table: &Table, kind: TransactionKind) {
        for row in 0..table.len() {
            let Some(product) = self.product_for(table, row) else {
                continue;
            };
            let Some(quantity) = table.int(row, "quantity").filter(|q| *q != 0) else {
                continue;
            };

            let mut tx = Transaction::new(kind, product.sku.clone(), quantity);
            tx.date = table.date(row, "date");
            tx.unit_price = table.float(row, "unit_price");
            tx.amount = table.float(row, "total_amount");
            tx.channel = table.text(row, "channel").map(|c| SalesChannel::parse_lenient(&c));
            tx.reference = table
                .text(row, "order_id")
                .or_else(|| table.text(row, "invoice_number"));
            tx.note = table.text(row, "reason").or_else(|| table.text(row, "notes"));
            tx.source = table.name.clone();
            self.snapshot.transactions.push(tx);
        }
    }

    fn parse_purchase_log(&mut self, table: &Table) {
        for row in 0..table.len() {
            let date = table.date(row, "date");
            let amount = table.float(row, "total_amount").unwrap_or(0.0);

            if let RowProduct::Known(product) = resolve_row(table, row, self.catalog) {
                if let Some(quantity) = table.int(row, "quantity").filter(|q| *q > 0) {
                    let mut tx = Transaction::new(TransactionKind::Purchase, product.sku.clone(), quantity);
                    tx.date = date;
                    tx.unit_price = table.float(row, "unit_price");
                    tx.amount = Some(amount).filter(|a| *a > 0.0);
                    tx.reference = table.text(row, "invoice_number");
                    tx.note = table.text(row, "supplier");
                    tx.source = table.name.clone();
                    self.snapshot.transactions.push(tx);
                    continue;
                }
            }

            if let Some(kg) = table.float(row, "quantity_kg").filter(|kg| *kg > 0.0) {
                self.snapshot.raw_materials.push(RawMaterialMovement {
                    date,
                    material: table
                        .text(row, "material_type")
                        .unwrap_or_else(|| "Raw Material".to_string()),
                    supplier: table.text(row, "supplier"),
                    quantity_kg: kg,
                    amount,
                });
            }
        }
    }

    fn parse_production_log(&mut self, table: &Table) {
        let output_columns: Vec<(usize, &'a Product)> = table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(idx, header)| {
                let rest = header.strip_prefix("output")?;
                self.catalog
                    .resolve(rest.trim_start_matches('_'))
                    .map(|p| (idx, p))
            })
            .collect();

        if output_columns.is_empty() {
            // Product + Quantity layout
            self.parse_movement_sheet(table, TransactionKind::Production);
        }

        for row in 0..table.len() {
            let date = table.date(row, "date");
            let batch = table.text(row, "batch_number");
            for (column, product) in &output_columns {
                let quantity = table.cell(row, *column).as_i64().unwrap_or(0);
                if quantity > 0 {
                    let mut tx = Transaction::new(TransactionKind::Production, product.sku.clone(), quantity);
                    tx.date = date;
                    tx.reference = batch.clone();
                    tx.source = table.name.clone();
                    self.snapshot.transactions.push(tx);
                }
            }
            if let Some(kg) = table.float(row, "raw_material_used_kg").filter(|kg| *kg > 0.0) {
                self.snapshot.raw_materials.push(RawMaterialMovement {
                    date,
                    material: "Raw Material".to_string(),
                    supplier: None,
                    quantity_kg: -kg,
                    amount: 0.0,
                });
            }
        }
    }

    fn parse_packaging(&mut self, table: &Table) {
        for row in 0..table.len() {
            let Some(material) = table
                .text(row, "material")
                .or_else(|| table.text(row, "product_name"))
            else {
                continue;
            };
            if TOTAL_ROW_LABELS.contains(&material.to_lowercase().as_str()) {
                continue;
            }
            self.snapshot.packaging.push(PackagingRow {
                material,
                opening: table.int(row, "opening_stock").unwrap_or(0),
                received: table
                    .int(row, "received")
                    .or_else(|| table.int(row, "purchases"))
                    .unwrap_or(0),
                used: table.int(row, "used").unwrap_or(0),
                recorded_closing: table.int(row, "closing_stock"),
            });
        }
    }

    fn parse_cartons(&mut self, table: &Table) {
        for row in 0..table.len() {
            let Some(product) = self.product_for(table, row) else {
                continue;
            };
            let cartons = table.int(row, "cartons").unwrap_or(0);
            let units_per_carton = table.int(row, "units_per_carton").unwrap_or_else(|| {
                match (table.int(row, "quantity"), cartons) {
                    (Some(total), c) if c > 0 => total / c,
                    _ => 0,
                }
            });
            self.snapshot.cartons.push(CartonRow {
                date: table.date(row, "date"),
                sku: product.sku.clone(),
                cartons,
                units_per_carton,
                destination: table.text(row, "destination"),
            });
        }
    }

    fn parse_packing(&mut self, table: &Table) {
        for row in 0..table.len() {
            let Some(product) = self.product_for(table, row) else {
                continue;
            };
            let quantity = table.int(row, "quantity").unwrap_or(0);
            if quantity > 0 {
                self.snapshot.packing.push(PackingRow {
                    date: table.date(row, "date"),
                    sku: product.sku.clone(),
                    quantity,
                });
            }
        }
    }

    /// The stock sheet's returns column and the Return sheet describe the same goods.
    fn drop_duplicated_returns(&mut self, return_sheet: &str) {
        let skus_with_rows: HashSet<String> = self
            .snapshot
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Return && t.source == return_sheet)
            .map(|t| t.sku.clone())
            .collect();
        for row in &mut self.snapshot.stock_rows {
            if row.returns != 0 && skus_with_rows.contains(&row.sku) {
                tracing::debug!(
                    "Using {} rows instead of stock sheet returns for {}",
                    return_sheet,
                    row.sku
                );
                row.returns = 0;
            }
        }
    }
}

/// Parses every known sheet. Only the stock sheet is mandatory here; other
/// absent sheets become warnings.
pub fn parse_inventory(
    workbook: &Workbook,
    config: &AppConfig,
    catalog: &ProductCatalog,
) -> Result<InventorySnapshot> {
    let names = &config.sheets;
    let stock = workbook
        .sheet(&names.stock)
        .ok_or_else(|| InventoryError::MissingSheetError {
            sheet: names.stock.clone(),
        })?;

    let mut parser = Parser {
        config,
        catalog,
        snapshot: InventorySnapshot {
            sheet_names: workbook.sheet_names().iter().map(|s| s.to_string()).collect(),
            ..InventorySnapshot::default()
        },
    };

    parser.parse_stock_sheet(stock)?;

    for missing in workbook.missing_sheets(&parser.config.sheets.required) {
        parser.warn(format!("Sheet '{}' not found in workbook", missing));
    }

    if let Some(table) = workbook.sheet(&names.returns) {
        parser.parse_movement_sheet(table, TransactionKind::Return);
        parser.drop_duplicated_returns(&table.name);
    }
    if let Some(table) = workbook.sheet(&names.packaging) {
        parser.parse_packaging(table);
    }
    if let Some(table) = workbook.sheet(&names.cartons) {
        parser.parse_cartons(table);
    }
    if let Some(table) = workbook.sheet(&names.packing) {
        parser.parse_packing(table);
    }

    if let Some(table) = workbook.sheet(&names.sales_log) {
        parser.parse_movement_sheet(table, TransactionKind::Sale);
    }
    if let Some(table) = workbook.sheet(&names.purchase_log) {
        parser.parse_purchase_log(table);
    }
    if let Some(table) = workbook.sheet(&names.production_log) {
        parser.parse_production_log(table);
    }
    if let Some(table) = workbook.sheet(&names.return_log) {
        parser.parse_movement_sheet(table, TransactionKind::Return);
    }
    if let Some(table) = workbook.sheet(&names.adjustment_log) {
        parser.parse_movement_sheet(table, TransactionKind::Adjustment);
    }

    let snapshot = parser.snapshot;
    tracing::info!(
        "📖 Parsed {} stock rows, {} transactions, {} packaging rows ({} warnings)",
        snapshot.stock_rows.len(),
        snapshot.transactions.len(),
        snapshot.packaging.len(),
        snapshot.warnings.len()
    );
    Ok(snapshot)
}

/// Blank workbook with every configured sheet and one stock row per product.
pub fn template_workbook(config: &AppConfig, catalog: &ProductCatalog) -> Workbook {
    let names = &config.sheets;
    let mut stock = Table::new(&names.stock, STOCK_HEADERS);
    for product in catalog.products() {
        stock.append_record(&[
            ("Product", Cell::text(product.display_name())),
            ("Weight", Cell::text(product.display_label())),
            ("FNSKU", Cell::text(&product.fnsku)),
            ("Opening Stock", Cell::from(0i64)),
            ("Min Stock", Cell::from(product.min_stock.unwrap_or(config.thresholds.low_stock))),
            ("Max Stock", Cell::from(product.max_stock.unwrap_or(config.thresholds.max_stock))),
            ("Unit Price", Cell::from(product.unit_price)),
        ]);
    }

    let mut packaging = Table::new(&names.packaging, PACKAGING_HEADERS);
    let mut pouches: Vec<&str> = catalog.products().iter().map(|p| p.pouch_size.as_str()).collect();
    pouches.dedup();
    for pouch in pouches {
        packaging.append_record(&[
            ("Material", Cell::text(format!("Pouch {}", pouch))),
            ("Opening Stock", Cell::from(0i64)),
        ]);
    }

    let production_headers = production_log_headers(catalog);
    let production_refs: Vec<&str> = production_headers.iter().map(String::as_str).collect();

    Workbook::new(vec![
        stock,
        Table::new(&names.returns, RETURN_HEADERS),
        packaging,
        Table::new(&names.cartons, CARTON_HEADERS),
        Table::new(&names.packing, PACKING_HEADERS),
        Table::new(&names.sales_log, SALES_LOG_HEADERS),
        Table::new(&names.purchase_log, PURCHASE_LOG_HEADERS),
        Table::new(&names.production_log, &production_refs),
        Table::new(&names.return_log, RETURN_LOG_HEADERS),
        Table::new(&names.adjustment_log, ADJUSTMENT_LOG_HEADERS),
    ])
}
