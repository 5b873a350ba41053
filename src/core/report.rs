use crate::config::{AppConfig, ThresholdConfig};
use crate::core::ledger::{packaging_summary, DateRange, Ledger, ValuationMethod};
use crate::core::sheets::parse_inventory;
use crate::core::workbook::{datetime_to_serial, Workbook};
use crate::domain::model::{InventorySnapshot, ProductCatalog, TransactionKind};
use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
use crate::domain::report::{Report, ReportFormat, ReportKind, ReportValue};
use crate::utils::error::{InventoryError, Result};
use crate::utils::format::escape_html;
use crate::utils::monitor::SystemMonitor;
use chrono::{Local, NaiveDateTime, NaiveTime};
use rust_xlsxwriter::{
    Color, ConditionalFormatCell, ConditionalFormatCellRule, Format, FormatBorder,
    Workbook as XlsxWorkbook,
};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Turns a ledger into tabular reports.
pub struct ReportBuilder<'a> {
    ledger: &'a Ledger,
    snapshot: &'a InventorySnapshot,
    catalog: &'a ProductCatalog,
    generated_at: NaiveDateTime,
    range: Option<DateRange>,
    valuation: ValuationMethod,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(
        ledger: &'a Ledger,
        snapshot: &'a InventorySnapshot,
        catalog: &'a ProductCatalog,
        generated_at: NaiveDateTime,
    ) -> Self {
        Self {
            ledger,
            snapshot,
            catalog,
            generated_at,
            range: None,
            valuation: ValuationMethod::Current,
        }
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_valuation(mut self, method: ValuationMethod) -> Self {
        self.valuation = method;
        self
    }

    pub fn build_all(&self, kinds: &[ReportKind]) -> Vec<Report> {
        kinds.iter().map(|kind| self.build(*kind)).collect()
    }

    pub fn build(&self, kind: ReportKind) -> Report {
        let mut report = match kind {
            ReportKind::StockSummary => self.stock_summary(),
            ReportKind::LowStock => self.low_stock(),
            ReportKind::Valuation => self.valuation(),
            ReportKind::Sales => self.sales(),
            ReportKind::Purchases => self.purchases(),
            ReportKind::Production => self.movement_report(
                ReportKind::Production,
                TransactionKind::Production,
                &["Date", "SKU", "Product", "Quantity", "Batch", "Note"],
            ),
            ReportKind::Returns => self.movement_report(
                ReportKind::Returns,
                TransactionKind::Return,
                &["Date", "SKU", "Product", "Quantity", "Reference", "Reason"],
            ),
            ReportKind::Packaging => self.packaging(),
            ReportKind::Abc => self.abc(),
            ReportKind::Reorder => self.reorder(),
        };
        if kind.uses_period() {
            report.period = self.range.map(|r| (r.start, r.end));
        }
        tracing::debug!("Built {} with {} rows", kind, report.row_count());
        report
    }

    fn stock_summary(&self) -> Report {
        let mut report = Report::new(
            ReportKind::StockSummary,
            self.generated_at,
            &[
                "SKU",
                "Product",
                "Pouch Size",
                "Opening",
                "Purchases",
                "Production",
                "Sales",
                "Returns",
                "Adjustments",
                "Current Stock",
                "Min Stock",
                "Max Stock",
                "Unit Price",
                "Stock Value",
                "Status",
            ],
        );
        report.stock_column = Some(9);

        for item in self.ledger.items() {
            report.push_row(vec![
                item.product.sku.clone().into(),
                item.product.display_name().into(),
                item.product.pouch_size.clone().into(),
                item.opening.into(),
                item.purchases.into(),
                item.production.into(),
                item.sales.into(),
                item.returns.into(),
                item.adjustments.into(),
                item.current_stock.into(),
                item.min_stock.into(),
                item.max_stock.into(),
                ReportValue::Money(item.unit_price),
                ReportValue::Money(item.stock_value()),
                item.status.label().into(),
            ]);
        }

        let summary = self.ledger.summary();
        report.totals = vec![
            ("Products".to_string(), (summary.product_count as i64).into()),
            ("Total Units".to_string(), summary.total_units.into()),
            ("Total Value".to_string(), ReportValue::Money(summary.total_value)),
            ("Need Reorder".to_string(), (summary.reorder_needed as i64).into()),
        ];
        report
    }

    fn low_stock(&self) -> Report {
        let mut report = Report::new(
            ReportKind::LowStock,
            self.generated_at,
            &["SKU", "Product", "Current Stock", "Min Stock", "Shortfall", "Status"],
        );
        report.stock_column = Some(2);

        let mut items: Vec<_> = self
            .ledger
            .items()
            .iter()
            .filter(|i| i.status.needs_reorder())
            .collect();
        items.sort_by_key(|i| (i.status, i.current_stock));

        for item in items {
            report.push_row(vec![
                item.product.sku.clone().into(),
                item.product.display_name().into(),
                item.current_stock.into(),
                item.min_stock.into(),
                (item.min_stock - item.current_stock).max(0).into(),
                item.status.label().into(),
            ]);
        }
        report.totals = vec![("Items".to_string(), (report.row_count() as i64).into())];
        report
    }

    fn valuation(&self) -> Report {
        let valuation = self.ledger.valuation(self.valuation);
        let mut report = Report::new(
            ReportKind::Valuation,
            self.generated_at,
            &["SKU", "Product", "Quantity", "Unit Cost", "Value", "Share"],
        );
        for line in &valuation.lines {
            report.push_row(vec![
                line.sku.clone().into(),
                line.name.clone().into(),
                line.quantity.into(),
                ReportValue::Money(line.unit_cost),
                ReportValue::Money(line.value),
                ReportValue::Percent(line.share_pct),
            ]);
        }
        let method = match valuation.method {
            ValuationMethod::Current => "Current price",
            ValuationMethod::WeightedAverage => "Weighted average cost",
        };
        report.totals = vec![
            ("Method".to_string(), method.into()),
            ("Total Value".to_string(), ReportValue::Money(valuation.total)),
        ];
        report
    }

    fn product_name(&self, sku: &str) -> String {
        self.catalog
            .get(sku)
            .map(|p| p.display_name())
            .unwrap_or_else(|| sku.to_string())
    }

    fn sales(&self) -> Report {
        let mut report = Report::new(
            ReportKind::Sales,
            self.generated_at,
            &["Date", "SKU", "Product", "Channel", "Quantity", "Amount", "Order ID", "Source"],
        );

        let mut sales = self.ledger.sales(self.range.as_ref());
        sales.sort_by_key(|t| t.date);
        let mut units = 0;
        let mut revenue = 0.0;
        for tx in sales {
            let amount = self.ledger.revenue(tx);
            units += tx.quantity.abs();
            revenue += amount;
            report.push_row(vec![
                tx.date.into(),
                tx.sku.clone().into(),
                self.product_name(&tx.sku).into(),
                tx.channel.map(|c| c.name()).unwrap_or("Unspecified").into(),
                tx.quantity.abs().into(),
                ReportValue::Money(amount),
                tx.reference.clone().map(ReportValue::Text).unwrap_or(ReportValue::Empty),
                tx.source.clone().into(),
            ]);
        }

        report.totals = vec![
            ("Units Sold".to_string(), units.into()),
            ("Revenue".to_string(), ReportValue::Money(revenue)),
        ];
        for channel in self.ledger.sales_by_channel(self.range.as_ref()) {
            let name = channel.channel.map(|c| c.name()).unwrap_or("Unspecified");
            report
                .totals
                .push((format!("{} revenue", name), ReportValue::Money(channel.revenue)));
        }
        report
    }

    fn purchases(&self) -> Report {
        let mut report = Report::new(
            ReportKind::Purchases,
            self.generated_at,
            &["Date", "Item", "Quantity", "Unit", "Amount", "Supplier / Reference"],
        );

        let mut purchases = self.ledger.of_kind(TransactionKind::Purchase, self.range.as_ref());
        purchases.sort_by_key(|t| t.date);
        let mut spend = 0.0;
        for tx in purchases {
            spend += tx.value();
            report.push_row(vec![
                tx.date.into(),
                self.product_name(&tx.sku).into(),
                tx.quantity.into(),
                "units".into(),
                ReportValue::Money(tx.value()),
                tx.reference.clone().map(ReportValue::Text).unwrap_or(ReportValue::Empty),
            ]);
        }

        let mut raw_kg = 0.0;
        for movement in self.snapshot.raw_materials.iter().filter(|m| {
            m.quantity_kg > 0.0
                && self
                    .range
                    .map_or(true, |r| m.date.is_some_and(|d| r.contains(d)))
        }) {
            raw_kg += movement.quantity_kg;
            spend += movement.amount;
            report.push_row(vec![
                movement.date.into(),
                movement.material.clone().into(),
                ReportValue::Float(movement.quantity_kg),
                "kg".into(),
                ReportValue::Money(movement.amount),
                movement
                    .supplier
                    .clone()
                    .map(ReportValue::Text)
                    .unwrap_or(ReportValue::Empty),
            ]);
        }

        report.totals = vec![
            ("Raw Material (kg)".to_string(), ReportValue::Float(raw_kg)),
            ("Total Spend".to_string(), ReportValue::Money(spend)),
        ];
        report
    }

    fn movement_report(&self, kind: ReportKind, tx_kind: TransactionKind, columns: &[&str]) -> Report {
        let mut report = Report::new(kind, self.generated_at, columns);
        let mut movements = self.ledger.of_kind(tx_kind, self.range.as_ref());
        movements.sort_by_key(|t| t.date);

        let mut units = 0;
        for tx in movements {
            units += tx.quantity.abs();
            report.push_row(vec![
                tx.date.into(),
                tx.sku.clone().into(),
                self.product_name(&tx.sku).into(),
                tx.quantity.abs().into(),
                tx.reference.clone().map(ReportValue::Text).unwrap_or(ReportValue::Empty),
                tx.note.clone().map(ReportValue::Text).unwrap_or(ReportValue::Empty),
            ]);
        }
        report.totals = vec![("Total Units".to_string(), units.into())];
        report
    }

    fn packaging(&self) -> Report {
        let summary = packaging_summary(self.snapshot, self.catalog);
        let mut report = Report::new(
            ReportKind::Packaging,
            self.generated_at,
            &["Material", "Opening", "Received", "Used", "Closing", "Recorded Closing"],
        );
        report.stock_column = Some(4);

        for line in &summary.materials {
            report.push_row(vec![
                line.material.clone().into(),
                line.opening.into(),
                line.received.into(),
                line.used.into(),
                line.closing.into(),
                line.recorded_closing.map(ReportValue::Int).unwrap_or(ReportValue::Empty),
            ]);
        }

        for (pouch, used) in &summary.pouch_usage {
            report
                .totals
                .push((format!("Pouches {} packed", pouch), (*used).into()));
        }
        let carton_units: i64 = summary.carton_units.iter().map(|(_, _, units)| units).sum();
        report.totals.push(("Units shipped in cartons".to_string(), carton_units.into()));
        report
            .totals
            .push(("Raw material net (kg)".to_string(), ReportValue::Float(summary.raw_material_kg)));
        report
    }

    fn abc(&self) -> Report {
        let mut report = Report::new(
            ReportKind::Abc,
            self.generated_at,
            &["Rank", "SKU", "Product", "Revenue", "Share", "Cumulative", "Class"],
        );
        for line in self.ledger.abc_analysis(self.range.as_ref()) {
            report.push_row(vec![
                (line.rank as i64).into(),
                line.sku.into(),
                line.name.into(),
                ReportValue::Money(line.revenue),
                ReportValue::Percent(line.share_pct),
                ReportValue::Percent(line.cumulative_pct),
                format!("{:?}", line.class).into(),
            ]);
        }
        report
    }

    fn reorder(&self) -> Report {
        let mut report = Report::new(
            ReportKind::Reorder,
            self.generated_at,
            &[
                "SKU",
                "Product",
                "Current Stock",
                "Min Stock",
                "Max Stock",
                "Reorder Qty",
                "Urgency",
                "Estimated Cost",
            ],
        );
        report.stock_column = Some(2);

        let mut cost = 0.0;
        for rec in self.ledger.reorder_recommendations() {
            cost += rec.estimated_cost;
            report.push_row(vec![
                rec.sku.into(),
                rec.name.into(),
                rec.current_stock.into(),
                rec.min_stock.into(),
                rec.max_stock.into(),
                rec.quantity.into(),
                rec.urgency.label().into(),
                ReportValue::Money(rec.estimated_cost),
            ]);
        }
        report.totals = vec![("Estimated Cost".to_string(), ReportValue::Money(cost))];
        report
    }
}

/// Serialises one report in the requested format.
pub fn export(report: &Report, format: ReportFormat, thresholds: &ThresholdConfig) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Xlsx => to_xlsx(report, thresholds),
        ReportFormat::Csv => to_csv(report),
        ReportFormat::Json => to_json(report),
        ReportFormat::Html => Ok(to_html(report, thresholds).into_bytes()),
    }
}

/// First sheet holds the header row and data rows only; title, period and totals go on "Summary".
pub fn to_xlsx(report: &Report, thresholds: &ThresholdConfig) -> Result<Vec<u8>> {
    let mut workbook = XlsxWorkbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x1F4E78))
        .set_border(FormatBorder::Thin);
    let money_format = Format::new().set_num_format("₹#,##0.00");
    let float_format = Format::new().set_num_format("#,##0.00");
    let percent_format = Format::new().set_num_format("0.0\"%\"");
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    sheet.set_name(&report.title)?;
    for (col, header) in report.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (idx, row) in report.rows.iter().enumerate() {
        let row_idx = idx as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            let col = col as u16;
            match value {
                ReportValue::Empty => {}
                ReportValue::Text(s) => {
                    sheet.write_string(row_idx, col, s)?;
                }
                ReportValue::Int(v) => {
                    sheet.write_number(row_idx, col, *v as f64)?;
                }
                ReportValue::Float(v) => {
                    sheet.write_number_with_format(row_idx, col, *v, &float_format)?;
                }
                ReportValue::Money(v) => {
                    sheet.write_number_with_format(row_idx, col, *v, &money_format)?;
                }
                ReportValue::Percent(v) => {
                    sheet.write_number_with_format(row_idx, col, *v, &percent_format)?;
                }
                ReportValue::Date(d) => {
                    let serial = datetime_to_serial(d.and_time(NaiveTime::MIN));
                    sheet.write_number_with_format(row_idx, col, serial, &date_format)?;
                }
            }
        }
    }

    if let (Some(col), false) = (report.stock_column, report.rows.is_empty()) {
        let last_row = report.rows.len() as u32;
        let col = col as u16;
        // 先加入的規則優先
        let critical = ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::LessThanOrEqualTo(
                thresholds.critical_stock as f64,
            ))
            .set_format(
                Format::new()
                    .set_font_color(Color::RGB(0x9C0006))
                    .set_background_color(Color::RGB(0xFFC7CE)),
            );
        let low = ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::LessThanOrEqualTo(
                thresholds.low_stock as f64,
            ))
            .set_format(
                Format::new()
                    .set_font_color(Color::RGB(0x9C5700))
                    .set_background_color(Color::RGB(0xFFEB9C)),
            );
        let over = ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::GreaterThan(thresholds.max_stock as f64))
            .set_format(Format::new().set_background_color(Color::RGB(0xDDEBF7)));
        sheet.add_conditional_format(1, col, last_row, col, &critical)?;
        sheet.add_conditional_format(1, col, last_row, col, &low)?;
        sheet.add_conditional_format(1, col, last_row, col, &over)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    let bold = Format::new().set_bold();
    summary.write_string_with_format(0, 0, &report.title, &bold)?;
    summary.write_string(1, 0, "Generated")?;
    summary.write_string(1, 1, report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string())?;
    let mut row_idx = 2;
    if let Some((start, end)) = report.period {
        summary.write_string(row_idx, 0, "Period")?;
        summary.write_string(row_idx, 1, format!("{} to {}", start, end))?;
        row_idx += 1;
    }
    summary.write_string(row_idx, 0, "Rows")?;
    summary.write_number(row_idx, 1, report.row_count() as f64)?;
    row_idx += 1;
    for (label, value) in &report.totals {
        summary.write_string(row_idx, 0, label)?;
        match value {
            ReportValue::Money(v) => {
                summary.write_number_with_format(row_idx, 1, *v, &money_format)?;
            }
            other => match other.as_f64() {
                Some(v) => {
                    summary.write_number(row_idx, 1, v)?;
                }
                None => {
                    summary.write_string(row_idx, 1, other.render())?;
                }
            },
        }
        row_idx += 1;
    }
    summary.autofit();

    Ok(workbook.save_to_buffer()?)
}

pub fn to_csv(report: &Report) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&report.columns)?;
    for row in &report.rows {
        writer.write_record(row.iter().map(ReportValue::render))?;
    }
    writer
        .into_inner()
        .map_err(|e| InventoryError::processing(format!("csv flush: {}", e)))
}

pub fn to_json(report: &Report) -> Result<Vec<u8>> {
    let rows: Vec<Value> = report
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = report
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(ReportValue::to_json))
                .collect();
            Value::Object(object)
        })
        .collect();
    let totals: Map<String, Value> = report
        .totals
        .iter()
        .map(|(label, value)| (label.clone(), value.to_json()))
        .collect();

    let document = json!({
        "kind": report.kind,
        "title": report.title,
        "generated_at": report.generated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "period": report.period.map(|(start, end)| json!({ "start": start, "end": end })),
        "columns": report.columns,
        "row_count": report.row_count(),
        "rows": rows,
        "totals": totals,
    });
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Self-contained page meant for the browser's print dialog.
pub fn to_html(report: &Report, thresholds: &ThresholdConfig) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    html.push_str(&format!("<title>{}</title>", escape_html(&report.title)));
    html.push_str(
        "<style>body{font-family:Arial,sans-serif;margin:24px;color:#222}\
         table{border-collapse:collapse;width:100%;font-size:12px}\
         th{background:#1f4e78;color:#fff;text-align:left}\
         th,td{border:1px solid #ccc;padding:4px 6px}\
         td.num{text-align:right}td.critical{background:#ffc7ce;color:#9c0006}\
         td.low{background:#ffeb9c;color:#9c5700}.meta{color:#666;font-size:12px}\
         @media print{body{margin:0}.noprint{display:none}}</style></head><body>",
    );
    html.push_str(&format!("<h1>{}</h1>", escape_html(&report.title)));
    html.push_str(&format!(
        "<p class=\"meta\">Generated {}",
        report.generated_at.format("%Y-%m-%d %H:%M")
    ));
    if let Some((start, end)) = report.period {
        html.push_str(&format!(" &middot; Period {} to {}", start, end));
    }
    html.push_str(&format!(" &middot; {} rows</p>", report.row_count()));
    html.push_str("<p class=\"noprint\"><button onclick=\"window.print()\">Print</button></p>");

    html.push_str("<table><thead><tr>");
    for column in &report.columns {
        html.push_str(&format!("<th>{}</th>", escape_html(column)));
    }
    html.push_str("</tr></thead><tbody>");
    for row in &report.rows {
        html.push_str("<tr>");
        for (col, value) in row.iter().enumerate() {
            let mut classes = Vec::new();
            if value.as_f64().is_some() {
                classes.push("num");
            }
            if report.stock_column == Some(col) {
                if let Some(v) = value.as_f64() {
                    if v <= thresholds.critical_stock as f64 {
                        classes.push("critical");
                    } else if v <= thresholds.low_stock as f64 {
                        classes.push("low");
                    }
                }
            }
            let text = match value {
                ReportValue::Money(v) => crate::utils::format::currency(*v),
                other => other.render(),
            };
            if classes.is_empty() {
                html.push_str(&format!("<td>{}</td>", escape_html(&text)));
            } else {
                html.push_str(&format!(
                    "<td class=\"{}\">{}</td>",
                    classes.join(" "),
                    escape_html(&text)
                ));
            }
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");

    if !report.totals.is_empty() {
        html.push_str("<h2>Totals</h2><table><tbody>");
        for (label, value) in &report.totals {
            let text = match value {
                ReportValue::Money(v) => crate::utils::format::currency(*v),
                other => other.render(),
            };
            html.push_str(&format!(
                "<tr><th>{}</th><td class=\"num\">{}</td></tr>",
                escape_html(label),
                escape_html(&text)
            ));
        }
        html.push_str("</tbody></table>");
    }
    html.push_str("</body></html>");
    html
}

/// Packs already-exported files into one zip held in memory.
pub fn bundle(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(data)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

/// What the pipeline should produce.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub kinds: Vec<ReportKind>,
    pub formats: Vec<ReportFormat>,
    pub range: Option<DateRange>,
    pub valuation: ValuationMethod,
    pub zip: bool,
}

impl ReportRequest {
    pub fn new(kinds: Vec<ReportKind>, formats: Vec<ReportFormat>) -> Self {
        Self {
            kinds,
            formats,
            range: None,
            valuation: ValuationMethod::Current,
            zip: false,
        }
    }
}

/// Workbook in, report files out.
pub struct ReportPipeline<S: Storage> {
    storage: S,
    config: AppConfig,
    catalog: ProductCatalog,
    request: ReportRequest,
    generated_at: NaiveDateTime,
}

impl<S: Storage> ReportPipeline<S> {
    pub fn new(storage: S, config: AppConfig, request: ReportRequest) -> Self {
        let catalog = ProductCatalog::from_config(&config);
        Self {
            storage,
            config,
            catalog,
            request,
            generated_at: Local::now().naive_local(),
        }
    }

    pub fn with_generated_at(mut self, generated_at: NaiveDateTime) -> Self {
        self.generated_at = generated_at;
        self
    }

    fn export_path(&self, name: &str) -> String {
        self.config
            .exports_dir()
            .join(name)
            .to_string_lossy()
            .to_string()
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for ReportPipeline<S> {
    async fn extract(&self) -> Result<InventorySnapshot> {
        let path = self.config.workbook_path().to_string_lossy().to_string();
        if !self.storage.exists(&path).await {
            return Err(InventoryError::not_found(format!("workbook {}", path)));
        }
        let workbook = Workbook::load(&self.storage, &path).await?;
        let snapshot = parse_inventory(&workbook, &self.config, &self.catalog)?;
        for warning in &snapshot.warnings {
            tracing::warn!("⚠️ {}", warning);
        }
        Ok(snapshot)
    }

    async fn transform(&self, snapshot: InventorySnapshot) -> Result<Vec<Report>> {
        let ledger = Ledger::from_snapshot(&self.catalog, &snapshot, &self.config.thresholds);
        let reports = ReportBuilder::new(&ledger, &snapshot, &self.catalog, self.generated_at)
            .with_range(self.request.range)
            .with_valuation(self.request.valuation)
            .build_all(&self.request.kinds);
        Ok(reports)
    }

    async fn load(&self, reports: Vec<Report>) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for report in &reports {
            for format in &self.request.formats {
                let data = export(report, *format, &self.config.thresholds)?;
                files.push((report.file_name(*format), data));
            }
        }

        let mut written = Vec::new();
        if self.request.zip {
            let zip_data = bundle(&files)?;
            let name = format!("reports_{}.zip", self.generated_at.format("%Y%m%d_%H%M%S"));
            tracing::debug!("Writing ZIP file ({} bytes, {} files)", zip_data.len(), files.len());
            let path = self.export_path(&name);
            self.storage.write_file(&path, &zip_data).await?;
            written.push(PathBuf::from(path));
        } else {
            for (name, data) in &files {
                let path = self.export_path(name);
                self.storage.write_file(&path, data).await?;
                written.push(PathBuf::from(path));
            }
        }
        Ok(written)
    }
}

/// Runs a pipeline phase by phase, optionally sampling CPU and memory.
pub struct ReportEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> ReportEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        let started = Instant::now();
        tracing::info!("📥 Loading workbook...");
        let snapshot = self.pipeline.extract().await?;
        tracing::info!(
            "Read {} stock rows, {} log entries",
            snapshot.stock_rows.len(),
            snapshot.transactions.len()
        );
        self.monitor.log_phase("extract");

        tracing::info!("🔄 Building reports...");
        let reports = self.pipeline.transform(snapshot).await?;
        for report in &reports {
            tracing::info!("  {} - {} rows", report.title, report.row_count());
        }
        self.monitor.log_phase("transform");

        tracing::info!("💾 Writing files...");
        let paths = self.pipeline.load(reports).await?;
        self.monitor.log_phase("load");
        self.monitor.log_final();

        tracing::info!(
            "✅ {} files written in {:?}",
            paths.len(),
            started.elapsed()
        );
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{SalesChannel, StockRow, Transaction};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files
                .get(path)
                .cloned()
                .ok_or_else(|| InventoryError::not_found(path.to_string()))
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().await.contains_key(path)
        }
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 8)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn fixture() -> (AppConfig, ProductCatalog, InventorySnapshot) {
        let config = AppConfig::with_defaults();
        let catalog = ProductCatalog::from_config(&config);
        let mut snapshot = InventorySnapshot::default();
        snapshot.stock_rows.push(StockRow {
            sku: "RC_0.5KG".to_string(),
            opening: 40,
            sales: vec![(SalesChannel::AmazonFba, 36)],
            ..StockRow::default()
        });
        snapshot.stock_rows.push(StockRow {
            sku: "RC_1.0KG".to_string(),
            opening: 200,
            ..StockRow::default()
        });
        let mut sale = Transaction::new(TransactionKind::Sale, "RC_1.0KG", 5);
        sale.date = NaiveDate::from_ymd_opt(2025, 6, 3);
        sale.amount = Some(500.0);
        sale.channel = Some(SalesChannel::Flipkart);
        snapshot.transactions.push(sale);
        (config, catalog, snapshot)
    }

    #[test]
    fn test_stock_summary_covers_catalog() {
        let (config, catalog, snapshot) = fixture();
        let ledger = Ledger::from_snapshot(&catalog, &snapshot, &config.thresholds);
        let report = ReportBuilder::new(&ledger, &snapshot, &catalog, at()).build(ReportKind::StockSummary);

        assert_eq!(report.row_count(), catalog.len());
        assert_eq!(report.columns[report.stock_column.unwrap()], "Current Stock");
        let half_kg = report
            .rows
            .iter()
            .find(|r| r[0] == ReportValue::text("RC_0.5KG"))
            .unwrap();
        assert_eq!(half_kg[9], ReportValue::Int(4));
        assert_eq!(half_kg[14], ReportValue::text("Critical"));
    }

    #[test]
    fn test_period_filters_sales() {
        let (config, catalog, snapshot) = fixture();
        let ledger = Ledger::from_snapshot(&catalog, &snapshot, &config.thresholds);
        let june = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        );

        let all = ReportBuilder::new(&ledger, &snapshot, &catalog, at()).build(ReportKind::Sales);
        let dated = ReportBuilder::new(&ledger, &snapshot, &catalog, at())
            .with_range(Some(june))
            .build(ReportKind::Sales);

        assert_eq!(all.row_count(), 2);
        assert_eq!(dated.row_count(), 1);
        assert!(dated.period.is_some());
        assert_eq!(dated.rows[0][5], ReportValue::Money(500.0));
    }

    #[test]
    fn test_csv_and_json_row_counts() {
        let (config, catalog, snapshot) = fixture();
        let ledger = Ledger::from_snapshot(&catalog, &snapshot, &config.thresholds);
        let report = ReportBuilder::new(&ledger, &snapshot, &catalog, at()).build(ReportKind::StockSummary);

        let csv_bytes = to_csv(&report).unwrap();
        let mut reader = csv::Reader::from_reader(csv_bytes.as_slice());
        assert_eq!(reader.records().count(), report.row_count());

        let json: Value = serde_json::from_slice(&to_json(&report).unwrap()).unwrap();
        assert_eq!(json["rows"].as_array().unwrap().len(), report.row_count());
        assert_eq!(json["kind"], "stock_summary");
    }

    #[test]
    fn test_html_escapes_and_flags_stock() {
        let at = at();
        let mut report = Report::new(ReportKind::LowStock, at, &["SKU", "Current Stock"]);
        report.stock_column = Some(1);
        report.push_row(vec!["<b>x</b>".into(), ReportValue::Int(2)]);

        let html = to_html(&report, &ThresholdConfig::default());
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(html.contains("class=\"num critical\""));
    }

    #[tokio::test]
    async fn test_pipeline_writes_zip_bundle() {
        let (config, catalog, _) = fixture();
        let storage = MockStorage::default();
        let template = crate::core::sheets::template_workbook(&config, &catalog);
        storage
            .write_file(&config.paths.workbook.to_string_lossy(), &template.to_xlsx().unwrap())
            .await
            .unwrap();

        let mut request = ReportRequest::new(
            vec![ReportKind::StockSummary, ReportKind::Reorder],
            vec![ReportFormat::Csv, ReportFormat::Json],
        );
        request.zip = true;
        let pipeline = ReportPipeline::new(storage.clone(), config, request).with_generated_at(at());
        let paths = ReportEngine::new(pipeline).run().await.unwrap();

        assert_eq!(paths.len(), 1);
        let data = storage
            .read_file(&paths[0].to_string_lossy())
            .await
            .unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 4);
    }

    #[tokio::test]
    async fn test_pipeline_missing_workbook() {
        let pipeline = ReportPipeline::new(
            MockStorage::default(),
            AppConfig::with_defaults(),
            ReportRequest::new(vec![ReportKind::StockSummary], vec![ReportFormat::Csv]),
        );
        let err = ReportEngine::new(pipeline).run().await.unwrap_err();
        assert!(matches!(err, InventoryError::NotFoundError { .. }));
    }
}
