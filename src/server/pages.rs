use super::html::{self, banner, layout, Banner};
use super::{status_for, today, AppState};
use crate::core::backup::BackupInfo;
use crate::core::dashboard::Dashboard;
use crate::core::entries::{Entry, EntryKind, FormFields, Recorder, OUTPUT_FIELD_PREFIX};
use crate::core::ledger::DateRange;
use crate::core::report::{export, ReportBuilder};
use crate::core::workbook::parse_text_date;
use crate::domain::model::StockStatus;
use crate::domain::report::{ReportFormat, ReportKind};
use crate::utils::error::InventoryError;
use crate::utils::format::{
    batch_number, currency, currency_compact, escape_html, file_size, number, percentage,
};
use axum::extract::{Form, Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use chrono::Local;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

fn error_banner(error: &InventoryError) -> String {
    match error {
        InventoryError::ValidationError { errors } => {
            banner(Banner::Error, "Please fix the following:", errors)
        }
        InventoryError::NotFoundError { .. } => banner(
            Banner::Warning,
            &error.user_friendly_message(),
            &["Create a blank workbook with `small-inventory template` or restore a backup".to_string()],
        ),
        _ => banner(
            Banner::Error,
            &error.user_friendly_message(),
            &[error.recovery_suggestion()],
        ),
    }
}

fn error_page(title: &str, active: &str, error: &InventoryError) -> Response {
    tracing::warn!("{} page failed: {}", title, error);
    (status_for(error), layout(title, active, &error_banner(error))).into_response()
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> Response {
    let (snapshot, ledger) = match state.load().await {
        Ok(loaded) => loaded,
        Err(e) => return error_page("Dashboard", "/", &e),
    };
    let view = Dashboard::build(&ledger, &snapshot, &state.catalog, &state.config, today());
    let mut body = String::new();

    if !view.warnings.is_empty() {
        body.push_str(&banner(
            Banner::Warning,
            &format!("{} issues found while reading the workbook", view.warnings.len()),
            &view.warnings,
        ));
    }

    let k = &view.kpis;
    body.push_str("<div class=\"cards\">");
    body.push_str(&html::card("Total Products", &k.total_products.to_string()));
    body.push_str(&html::card("Units In Stock", &number(k.total_units)));
    body.push_str(&html::card("Stock Value", &currency_compact(k.total_value)));
    body.push_str(&html::card("Low Stock Items", &k.low_stock_items.to_string()));
    body.push_str(&html::card(
        &format!("Units Sold ({} days)", k.range.days()),
        &number(k.sales_units),
    ));
    body.push_str(&html::card("Revenue", &currency_compact(k.sales_revenue)));
    body.push_str("</div>");

    body.push_str("<h3>Alerts</h3>");
    if view.alerts.is_empty() {
        body.push_str(&banner(Banner::Success, "All products are within normal stock levels", &[]));
    }
    for alert in &view.alerts {
        let kind = match alert.status {
            StockStatus::OutOfStock | StockStatus::Critical => Banner::Error,
            StockStatus::Low => Banner::Warning,
            _ => Banner::Info,
        };
        body.push_str(&banner(kind, &format!("{}: {}", alert.name, alert.message), &[]));
    }

    body.push_str("<h3>Stock Levels</h3><table><thead><tr><th>SKU</th><th>Weight</th>\
                   <th>Current</th><th>Min</th><th>Max</th><th>Status</th><th></th></tr></thead><tbody>");
    let widest = view
        .stock_levels
        .iter()
        .map(|p| p.current_stock.max(p.max_stock))
        .max()
        .unwrap_or(1)
        .max(1);
    for point in &view.stock_levels {
        let width = point.current_stock.max(0) * 200 / widest;
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
             <td class=\"num\">{}</td><td>{}</td><td><span class=\"bar\" style=\"width:{}px;background:{}\"></span></td></tr>",
            escape_html(&point.sku),
            escape_html(&point.label),
            number(point.current_stock),
            number(point.min_stock),
            number(point.max_stock),
            html::status_badge(point.status.label(), point.status.color()),
            width,
            point.status.color(),
        ));
    }
    body.push_str("</tbody></table>");

    body.push_str("<h3>Channel Performance</h3>");
    let channel_rows: Vec<Vec<String>> = view
        .channels
        .iter()
        .map(|c| {
            vec![
                c.channel.map(|ch| ch.name()).unwrap_or("Unspecified").to_string(),
                c.orders.to_string(),
                number(c.units),
                currency(c.revenue),
                percentage(c.share_pct),
            ]
        })
        .collect();
    body.push_str(&html::table(
        &["Channel", "Orders", "Units", "Revenue", "Share"],
        &channel_rows,
        &[1, 2, 3, 4],
    ));

    body.push_str("<h3>Daily Sales</h3>");
    let daily_rows: Vec<Vec<String>> = view
        .daily_trend
        .iter()
        .map(|d| vec![d.date.to_string(), number(d.units), currency(d.revenue)])
        .collect();
    body.push_str(&html::table(&["Date", "Units", "Revenue"], &daily_rows, &[1, 2]));

    body.push_str("<h3>Recent Activity</h3>");
    let activity_rows: Vec<Vec<String>> = view
        .recent_activity
        .iter()
        .map(|a| {
            vec![
                a.date.to_string(),
                a.kind.name().to_string(),
                a.name.clone(),
                a.quantity.to_string(),
                a.channel.clone().unwrap_or_default(),
                a.reference.clone().unwrap_or_default(),
            ]
        })
        .collect();
    body.push_str(&html::table(
        &["Date", "Type", "Product", "Quantity", "Channel", "Reference"],
        &activity_rows,
        &[3],
    ));

    body.push_str("<h3>Stock Value Breakdown</h3>");
    let value_rows: Vec<Vec<String>> = view
        .value_breakdown
        .iter()
        .map(|v| vec![v.name.clone(), currency(v.value), percentage(v.share_pct)])
        .collect();
    body.push_str(&html::table(&["Product", "Value", "Share"], &value_rows, &[1, 2]));

    layout("Dashboard", "/", &body).into_response()
}

fn field(label: &str, input: String) -> String {
    format!("<div><label>{}</label>{}</div>", escape_html(label), input)
}

fn input(name: &str, kind: &str, required: bool, value: &str) -> String {
    format!(
        "<input type=\"{}\" name=\"{}\" value=\"{}\"{}{}>",
        kind,
        name,
        escape_html(value),
        if kind == "number" { " step=\"any\"" } else { "" },
        if required { " required" } else { "" }
    )
}

fn entry_form(state: &AppState, kind: EntryKind) -> String {
    let today = today().to_string();
    let products: Vec<String> = state
        .catalog
        .products()
        .iter()
        .map(|p| p.sku.clone())
        .collect();
    let channels = state.config.channels.clone();

    let mut fields = vec![field("Date", input("date", "date", true, &today))];
    match kind {
        EntryKind::Opening => {
            fields.push(field("Product", html::select("product", &products, true)));
            fields.push(field("Quantity", input("quantity", "number", true, "")));
        }
        EntryKind::Sale => {
            fields.push(field("Product", html::select("product", &products, true)));
            fields.push(field("Channel", html::select("channel", &channels, true)));
            fields.push(field("Quantity", input("quantity", "number", true, "")));
            fields.push(field("Unit Price", input("unit_price", "number", false, "")));
            fields.push(field("Total Amount", input("total_amount", "number", false, "")));
            fields.push(field("Order ID", input("order_id", "text", false, "")));
            fields.push(field("Customer", input("customer", "text", false, "")));
        }
        EntryKind::Purchase => {
            fields.push(field("Supplier", input("supplier", "text", true, "")));
            fields.push(field("Material Type", input("material_type", "text", false, "Raw Chana")));
            fields.push(field("Product (finished goods)", html::select("product", &products, false)));
            fields.push(field("Quantity (units)", input("quantity", "number", false, "")));
            fields.push(field("Quantity (kg)", input("quantity_kg", "number", false, "")));
            fields.push(field("Rate", input("rate", "number", false, "")));
            fields.push(field("Total Amount", input("total_amount", "number", false, "")));
            fields.push(field("Invoice Number", input("invoice_number", "text", false, "")));
            fields.push(field("Quality Grade", input("quality_grade", "text", false, "")));
            fields.push(field("Payment Method", input("payment_method", "text", false, "")));
        }
        EntryKind::Production => {
            fields.push(field(
                "Batch Number",
                input("batch_number", "text", true, &batch_number(super::today(), 1)),
            ));
            fields.push(field("Raw Material Used (kg)", input("raw_material_used_kg", "number", true, "")));
            for product in state.catalog.products() {
                fields.push(field(
                    &format!("Output {}", product.display_label()),
                    input(&format!("{}{}", OUTPUT_FIELD_PREFIX, product.sku), "number", false, ""),
                ));
            }
            fields.push(field("Operator", input("operator", "text", false, "")));
        }
        EntryKind::Return => {
            fields.push(field("Product", html::select("product", &products, true)));
            fields.push(field("Channel", html::select("channel", &channels, false)));
            fields.push(field("Quantity", input("quantity", "number", true, "")));
            fields.push(field("Reason", input("reason", "text", true, "")));
            fields.push(field("Order ID", input("order_id", "text", false, "")));
            fields.push(field("Condition", input("condition", "text", false, "")));
        }
        EntryKind::Adjustment => {
            fields.push(field("Product", html::select("product", &products, true)));
            fields.push(field("Quantity (+/-)", input("quantity", "number", true, "")));
            fields.push(field("Reason", input("reason", "text", true, "")));
        }
    }
    fields.push(field("Notes", input("notes", "text", false, "")));

    format!(
        "<form class=\"entry\" id=\"{slug}\" method=\"post\" action=\"/entry/{slug}\"><h3>{title}</h3>{fields}\
         <button type=\"submit\">Save</button></form>",
        slug = kind.slug(),
        title = kind.title(),
        fields = fields.concat(),
    )
}

fn entry_page(state: &AppState, notice: &str) -> Html<String> {
    let mut body = notice.to_string();
    body.push_str("<p>");
    for kind in EntryKind::ALL {
        body.push_str(&format!("<a href=\"#{}\">{}</a> &middot; ", kind.slug(), kind.title()));
    }
    body.push_str("</p>");
    for kind in EntryKind::ALL {
        body.push_str(&entry_form(state, kind));
    }
    layout("Data Entry", "/entry", &body)
}

pub async fn entry_forms(State(state): State<Arc<AppState>>) -> Html<String> {
    entry_page(&state, "")
}

pub async fn submit_entry(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let kind: EntryKind = match kind.parse() {
        Ok(kind) => kind,
        Err(message) => {
            let error = InventoryError::not_found(message);
            return (status_for(&error), entry_page(&state, &error_banner(&error))).into_response();
        }
    };
    let entry = Entry::from_form(kind, &FormFields::from(fields));

    let _guard = state.write_lock.lock().await;
    let outcome = Recorder::new(&state.storage, &state.config, &state.catalog)
        .with_backups(&state.backups)
        .record(&entry, today())
        .await;

    match outcome {
        Ok(outcome) => {
            let mut notice = banner(
                Banner::Success,
                &format!(
                    "{} saved to '{}' row {}",
                    kind.title(),
                    outcome.sheet,
                    outcome.row
                ),
                &outcome
                    .backup
                    .iter()
                    .map(|b| format!("Backup taken first: {}", b))
                    .collect::<Vec<_>>(),
            );
            if !outcome.warnings.is_empty() {
                notice.push_str(&banner(Banner::Warning, "Saved with warnings:", &outcome.warnings));
            }
            entry_page(&state, &notice).into_response()
        }
        Err(e) => {
            tracing::warn!("Entry rejected: {}", e);
            (status_for(&e), entry_page(&state, &error_banner(&e))).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl PeriodQuery {
    pub fn range(&self) -> Option<DateRange> {
        let from = self.from.as_deref().and_then(parse_text_date);
        let to = self.to.as_deref().and_then(parse_text_date);
        match (from, to) {
            (Some(from), Some(to)) => Some(DateRange::new(from, to)),
            (Some(from), None) => Some(DateRange::new(from, today())),
            (None, Some(to)) => Some(DateRange::new(chrono::NaiveDate::MIN, to)),
            (None, None) => None,
        }
    }

    fn query_string(&self) -> String {
        match self.range() {
            Some(range) => format!("?from={}&to={}", range.start, range.end),
            None => String::new(),
        }
    }
}

pub async fn reports(State(state): State<Arc<AppState>>, Query(period): Query<PeriodQuery>) -> Html<String> {
    let mut body = String::from(
        "<form method=\"get\" action=\"/reports\">Period: \
         <input type=\"date\" name=\"from\"> to <input type=\"date\" name=\"to\"> \
         <button type=\"submit\">Apply</button></form>",
    );
    if let Some(range) = period.range() {
        body.push_str(&banner(
            Banner::Info,
            &format!("Dated reports limited to {} .. {}", range.start, range.end),
            &[],
        ));
    }

    let formats: Vec<&str> = state
        .config
        .export
        .formats
        .iter()
        .map(String::as_str)
        .chain(ReportFormat::ALL.iter().map(|f| f.extension()))
        .collect();
    let mut unique_formats: Vec<&str> = Vec::new();
    for format in formats {
        if !unique_formats.contains(&format) {
            unique_formats.push(format);
        }
    }

    body.push_str("<table><thead><tr><th>Report</th><th>Download</th></tr></thead><tbody>");
    let query = period.query_string();
    for kind in ReportKind::ALL {
        let links: Vec<String> = unique_formats
            .iter()
            .map(|format| {
                format!(
                    "<a href=\"/reports/{}/{}{}\">{}</a>",
                    kind.slug(),
                    format,
                    escape_html(&query),
                    format.to_uppercase()
                )
            })
            .collect();
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>",
            kind.title(),
            links.join(" &middot; ")
        ));
    }
    body.push_str("</tbody></table>");
    layout("Reports", "/reports", &body)
}

pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Path((kind, format)): Path<(String, String)>,
    Query(period): Query<PeriodQuery>,
) -> Response {
    let (kind, format) = match (kind.parse::<ReportKind>(), format.parse::<ReportFormat>()) {
        (Ok(kind), Ok(format)) => (kind, format),
        (Err(message), _) | (_, Err(message)) => {
            return error_page("Reports", "/reports", &InventoryError::not_found(message));
        }
    };

    let (snapshot, ledger) = match state.load().await {
        Ok(loaded) => loaded,
        Err(e) => return error_page("Reports", "/reports", &e),
    };
    let report = ReportBuilder::new(&ledger, &snapshot, &state.catalog, Local::now().naive_local())
        .with_range(period.range())
        .build(kind);

    match export(&report, format, &state.config.thresholds) {
        Ok(bytes) => {
            tracing::info!("📤 Exported {} as {} ({} rows)", kind, format, report.row_count());
            (
                [
                    (header::CONTENT_TYPE, format.mime_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", report.file_name(format)),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => error_page("Reports", "/reports", &e),
    }
}

async fn backups_page(state: &AppState, notice: String) -> Response {
    let mut body = notice;

    match state.backups.statistics().await {
        Ok(stats) => {
            body.push_str("<div class=\"cards\">");
            body.push_str(&html::card("Backups", &stats.total_backups.to_string()));
            body.push_str(&html::card("Total Size", &file_size(stats.total_size_bytes)));
            body.push_str(&html::card(
                "Newest",
                &stats
                    .newest
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ));
            body.push_str("</div>");
        }
        Err(e) => body.push_str(&error_banner(&e)),
    }

    body.push_str(
        "<form class=\"entry\" method=\"post\" action=\"/backups\"><h3>Create Backup</h3>\
         <div><label>Type</label><select name=\"action\"><option value=\"manual\">Workbook copy</option>\
         <option value=\"full\">Full system (zip)</option></select></div>\
         <div><label>Description</label><input type=\"text\" name=\"description\"></div>\
         <button type=\"submit\">Create</button></form>",
    );

    let listed: Vec<BackupInfo> = match state.backups.list().await {
        Ok(listed) => listed,
        Err(e) => {
            body.push_str(&error_banner(&e));
            Vec::new()
        }
    };
    let rows: Vec<Vec<String>> = listed
        .iter()
        .map(|b| {
            vec![
                b.file_name.clone(),
                b.backup_type.map(|t| t.label()).unwrap_or("Unknown").to_string(),
                file_size(b.size_bytes),
                b.created.format("%Y-%m-%d %H:%M:%S").to_string(),
                b.description.clone(),
            ]
        })
        .collect();
    body.push_str(&html::table(
        &["File", "Type", "Size", "Created", "Description"],
        &rows,
        &[2],
    ));

    layout("Backups", "/backups", &body).into_response()
}

pub async fn backups(State(state): State<Arc<AppState>>) -> Response {
    backups_page(&state, String::new()).await
}

#[derive(Debug, Deserialize)]
pub struct BackupForm {
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_backup(State(state): State<Arc<AppState>>, Form(form): Form<BackupForm>) -> Response {
    let description = form
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("Created from dashboard")
        .to_string();

    let result = {
        let _guard = state.write_lock.lock().await;
        match form.action.as_str() {
            "full" => state.backups.create_full_system().await,
            _ => state.backups.create_manual(&description).await,
        }
    };

    let notice = match result {
        Ok(info) => banner(
            Banner::Success,
            &format!("Backup created: {} ({})", info.file_name, file_size(info.size_bytes)),
            &[],
        ),
        Err(e) => {
            tracing::warn!("Backup failed: {}", e);
            let status = status_for(&e);
            let mut response = backups_page(&state, error_banner(&e)).await;
            *response.status_mut() = status;
            return response;
        }
    };
    backups_page(&state, notice).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_query_orders_dates() {
        let query = PeriodQuery {
            from: Some("2025-06-30".to_string()),
            to: Some("2025-06-01".to_string()),
        };
        let range = query.range().unwrap();
        assert!(range.start < range.end);
        assert_eq!(query.query_string(), "?from=2025-06-01&to=2025-06-30");
    }

    #[test]
    fn test_blank_period_is_unbounded() {
        assert!(PeriodQuery::default().range().is_none());
    }
}
