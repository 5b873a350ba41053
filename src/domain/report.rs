use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    StockSummary,
    LowStock,
    Valuation,
    Sales,
    Purchases,
    Production,
    Returns,
    Packaging,
    Abc,
    Reorder,
}

impl ReportKind {
    pub const ALL: [ReportKind; 10] = [
        ReportKind::StockSummary,
        ReportKind::LowStock,
        ReportKind::Valuation,
        ReportKind::Sales,
        ReportKind::Purchases,
        ReportKind::Production,
        ReportKind::Returns,
        ReportKind::Packaging,
        ReportKind::Abc,
        ReportKind::Reorder,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Self::StockSummary => "stock_summary",
            Self::LowStock => "low_stock",
            Self::Valuation => "valuation",
            Self::Sales => "sales",
            Self::Purchases => "purchases",
            Self::Production => "production",
            Self::Returns => "returns",
            Self::Packaging => "packaging",
            Self::Abc => "abc",
            Self::Reorder => "reorder",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::StockSummary => "Stock Summary",
            Self::LowStock => "Low Stock Alert",
            Self::Valuation => "Inventory Valuation",
            Self::Sales => "Sales Report",
            Self::Purchases => "Purchase Report",
            Self::Production => "Production Report",
            Self::Returns => "Returns Report",
            Self::Packaging => "Packaging Materials",
            Self::Abc => "ABC Analysis",
            Self::Reorder => "Reorder Recommendations",
        }
    }

    /// Reports whose rows come from dated transactions honour a period filter.
    pub fn uses_period(&self) -> bool {
        matches!(
            self,
            Self::Sales | Self::Purchases | Self::Production | Self::Returns | Self::Abc
        )
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.slug() == wanted)
            .ok_or_else(|| format!("unknown report kind '{}'", s))
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Xlsx,
    Csv,
    Json,
    Html,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 4] = [
        ReportFormat::Xlsx,
        ReportFormat::Csv,
        ReportFormat::Json,
        ReportFormat::Html,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Html => "text/html; charset=utf-8",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| format!("unsupported export format '{}'", s))
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Money(f64),
    Percent(f64),
    Date(NaiveDate),
}

impl ReportValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) | Self::Money(v) | Self::Percent(v) => Some(*v),
            _ => None,
        }
    }

    /// Plain text used by csv and html output.
    pub fn render(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format!("{:.2}", v),
            Self::Money(v) => format!("{:.2}", v),
            Self::Percent(v) => format!("{:.1}%", v),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Int(v) => Value::from(*v),
            Self::Float(v) | Self::Money(v) | Self::Percent(v) => Value::from(*v),
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl From<&str> for ReportValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ReportValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ReportValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Option<NaiveDate>> for ReportValue {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(Self::Date).unwrap_or(Self::Empty)
    }
}

/// A tabular report ready for any exporter.
#[derive(Debug, Clone)]
pub struct Report {
    pub kind: ReportKind,
    pub title: String,
    pub generated_at: NaiveDateTime,
    pub period: Option<(NaiveDate, NaiveDate)>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ReportValue>>,
    pub totals: Vec<(String, ReportValue)>,
    /// Column that receives stock-level conditional formatting.
    pub stock_column: Option<usize>,
}

impl Report {
    pub fn new(kind: ReportKind, generated_at: NaiveDateTime, columns: &[&str]) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            generated_at,
            period: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            totals: Vec::new(),
            stock_column: None,
        }
    }

    pub fn push_row(&mut self, row: Vec<ReportValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `<kind>_<YYYYmmdd_HHMMSS>.<ext>`
    pub fn file_name(&self, format: ReportFormat) -> String {
        format!(
            "{}_{}.{}",
            crate::utils::format::sanitize_filename(self.kind.slug()),
            self.generated_at.format("%Y%m%d_%H%M%S"),
            format.extension()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_format_parsing() {
        assert_eq!("low-stock".parse::<ReportKind>().unwrap(), ReportKind::LowStock);
        assert_eq!("ABC".parse::<ReportKind>().unwrap(), ReportKind::Abc);
        assert!("pdf".parse::<ReportFormat>().is_err());
        assert_eq!(".CSV".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
    }

    #[test]
    fn test_file_name() {
        let at = NaiveDate::from_ymd_opt(2025, 6, 8)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap();
        let report = Report::new(ReportKind::StockSummary, at, &["SKU"]);
        assert_eq!(
            report.file_name(ReportFormat::Xlsx),
            "stock_summary_20250608_143005.xlsx"
        );
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(ReportValue::Money(12.5).render(), "12.50");
        assert_eq!(ReportValue::Percent(33.333).render(), "33.3%");
        assert_eq!(ReportValue::from(None::<NaiveDate>), ReportValue::Empty);
        assert_eq!(ReportValue::Int(3).to_json(), serde_json::json!(3));
    }
}
