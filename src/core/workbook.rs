use crate::domain::ports::Storage;
use crate::utils::error::{InventoryError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_xlsxwriter::Format;
use std::io::Cursor;

/// A typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

const TEXT_DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"];

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 1900-01-01 .. 9999-12-31
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let days = serial.trunc() as i64;
    let millis = ((serial - serial.trunc()) * 86_400_000.0).round() as i64;
    excel_epoch()
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::milliseconds(millis))
}

pub fn datetime_to_serial(datetime: NaiveDateTime) -> f64 {
    let delta = datetime - excel_epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}

impl Cell {
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => serial_to_datetime(dt.as_f64())
                .map(Cell::Date)
                .unwrap_or(Cell::Number(dt.as_f64())),
            Data::DateTimeIso(s) => parse_text_date(s)
                .map(|d| Cell::Date(d.and_time(NaiveTime::MIN)))
                .unwrap_or_else(|| Cell::Text(s.clone())),
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Text(e.to_string()),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Date(d) if d.time() == NaiveTime::MIN => d.format("%Y-%m-%d").to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric value; text is accepted after stripping grouping commas and currency signs.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, ',' | '₹' | ' '))
                    .collect();
                if cleaned.is_empty() || cleaned == "-" {
                    None
                } else {
                    cleaned.parse::<f64>().ok()
                }
            }
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|v| v.round() as i64)
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(d.date()),
            Cell::Number(n) => serial_to_datetime(*n).map(|d| d.date()),
            Cell::Text(s) => parse_text_date(s),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value.and_time(NaiveTime::MIN))
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Empty)
    }
}

pub fn parse_text_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // 含時間的 ISO 字串只取日期部分
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

const HEADER_ALIASES: &[(&str, &[&str])] = &[
    (
        "product_name",
        &["product", "product name", "products", "item", "item name", "description", "particulars"],
    ),
    ("opening_stock", &["opening stock", "opening", "op stock", "opening balance"]),
    ("purchases", &["purchase", "purchases", "purchased", "inward purchase"]),
    ("production", &["production", "produced", "manufactured"]),
    ("sales", &["sales", "sale", "sold", "total sales"]),
    ("fba", &["fba", "amazon fba"]),
    ("easyship", &["easyship", "easy ship", "amazon easyship"]),
    ("flipkart", &["flipkart"]),
    ("others", &["others", "other", "other sales"]),
    ("returns", &["return", "returns", "returned"]),
    (
        "closing_stock",
        &["closing stock", "closing", "current stock", "closing balance", "balance"],
    ),
    ("min_stock", &["minimum stock", "min stock", "reorder level", "min"]),
    ("max_stock", &["maximum stock", "max stock", "max"]),
    ("unit_price", &["price", "rate", "unit price", "mrp", "selling price"]),
    ("stock_value", &["value", "stock value"]),
    ("quantity", &["qty", "quantity", "units", "pcs"]),
    ("quantity_kg", &["quantity kg", "qty kg", "kg"]),
    ("channel", &["channel", "platform", "sales channel", "marketplace"]),
    ("order_id", &["order id", "order no", "order number"]),
    ("total_amount", &["amount", "total", "total amount"]),
    ("weight", &["weight", "size", "pack size"]),
    ("material", &["material", "packaging material", "pouch", "pouch size"]),
    ("material_type", &["material type", "raw material"]),
    ("received", &["received", "inward", "in"]),
    ("used", &["used", "consumed", "outward", "out"]),
    ("cartons", &["cartons", "carton", "no of cartons", "cartoons"]),
    (
        "units_per_carton",
        &["units per carton", "qty per carton", "pcs per carton", "per carton"],
    ),
    ("destination", &["destination", "warehouse", "fc", "fulfilment center"]),
    ("supplier", &["supplier", "vendor", "supplier name"]),
    ("invoice_number", &["invoice", "invoice number", "invoice no"]),
    ("batch_number", &["batch", "batch number", "batch no"]),
    ("raw_material_used_kg", &["raw material used", "raw material used kg"]),
    ("notes", &["notes", "note", "remarks", "comments"]),
];

/// Trim, lower-case, collapse whitespace and map through the alias table.
pub fn normalize_header(raw: &str) -> String {
    let collapsed = raw
        .replace(['_', '(', ')', ':'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    for (canonical, aliases) in HEADER_ALIASES {
        if aliases.contains(&collapsed.as_str()) || *canonical == collapsed {
            return canonical.to_string();
        }
    }
    collapsed.replace(' ', "_")
}

/// One worksheet: an optional preamble (title rows above the header), the header and data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub name: String,
    pub preamble: Vec<Vec<Cell>>,
    pub raw_headers: Vec<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            name: name.into(),
            preamble: Vec::new(),
            raw_headers: headers.iter().map(|h| h.to_string()).collect(),
            headers: headers.iter().map(|h| normalize_header(h)).collect(),
            rows: Vec::new(),
        }
    }

    /// The header row is the first row with a non-empty cell; blank data rows are dropped.
    pub fn from_rows(name: impl Into<String>, mut grid: Vec<Vec<Cell>>) -> Self {
        let name = name.into();
        let Some(header_idx) = grid
            .iter()
            .position(|row| row.iter().any(|c| !c.is_empty()))
        else {
            return Self {
                name,
                ..Self::default()
            };
        };

        let rest = grid.split_off(header_idx + 1);
        let header_row = grid.pop().unwrap_or_default();
        let raw_headers: Vec<String> = header_row.iter().map(Cell::as_text).collect();
        let headers = raw_headers.iter().map(|h| normalize_header(h)).collect();

        Self {
            name,
            preamble: grid,
            raw_headers,
            headers,
            rows: rest
                .into_iter()
                .filter(|row| row.iter().any(|c| !c.is_empty()))
                .collect(),
        }
    }

    pub fn column(&self, key: &str) -> Option<usize> {
        let wanted = normalize_header(key);
        self.headers.iter().position(|h| *h == wanted)
    }

    pub fn find_column(&self, keys: &[&str]) -> Option<usize> {
        keys.iter().find_map(|k| self.column(k))
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.column(key).is_some()
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY)
    }

    pub fn get(&self, row: usize, key: &str) -> Option<&Cell> {
        let column = self.column(key)?;
        Some(self.cell(row, column))
    }

    pub fn text(&self, row: usize, key: &str) -> Option<String> {
        self.get(row, key)
            .map(Cell::as_text)
            .filter(|s| !s.is_empty())
    }

    pub fn int(&self, row: usize, key: &str) -> Option<i64> {
        self.get(row, key).and_then(Cell::as_i64)
    }

    pub fn float(&self, row: usize, key: &str) -> Option<f64> {
        self.get(row, key).and_then(Cell::as_f64)
    }

    pub fn date(&self, row: usize, key: &str) -> Option<NaiveDate> {
        self.get(row, key).and_then(Cell::as_date)
    }

    /// Adds a column if absent and returns its index.
    pub fn ensure_column(&mut self, header: &str) -> usize {
        if let Some(idx) = self.column(header) {
            return idx;
        }
        self.raw_headers.push(header.to_string());
        self.headers.push(normalize_header(header));
        self.headers.len() - 1
    }

    pub fn set(&mut self, row: usize, header: &str, value: Cell) -> Result<()> {
        let column = self.ensure_column(header);
        let width = self.headers.len();
        let target = self.rows.get_mut(row).ok_or_else(|| {
            InventoryError::workbook(format!("row {} out of range in '{}'", row + 1, self.name))
        })?;
        if target.len() < width {
            target.resize(width, Cell::Empty);
        }
        target[column] = value;
        Ok(())
    }

    /// Appends a record keyed by header; unknown headers become new columns.
    pub fn append_record(&mut self, record: &[(&str, Cell)]) -> usize {
        let columns: Vec<usize> = record.iter().map(|(h, _)| self.ensure_column(h)).collect();
        let mut row = vec![Cell::Empty; self.headers.len()];
        for (column, (_, value)) in columns.into_iter().zip(record) {
            row[column] = value.clone();
        }
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 1-based spreadsheet row number of a data row, for messages.
    pub fn sheet_row_number(&self, row: usize) -> usize {
        self.preamble.len() + row + 2
    }
}

/// All sheets of a workbook, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Table>,
}

impl Workbook {
    pub fn new(sheets: Vec<Table>) -> Self {
        Self { sheets }
    }

    /// Reads any format calamine understands (xlsx, xls, ods).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let mut sheets = Vec::new();

        for name in reader.sheet_names() {
            let range = reader.worksheet_range(&name)?;
            let grid = range
                .rows()
                .map(|row| row.iter().map(Cell::from_data).collect())
                .collect();
            sheets.push(Table::from_rows(name, grid));
        }

        tracing::debug!("Read workbook with {} sheets", sheets.len());
        Ok(Self { sheets })
    }

    pub async fn load<S: Storage>(storage: &S, path: &str) -> Result<Self> {
        let bytes = storage.read_file(path).await?;
        Self::from_bytes(&bytes)
    }

    pub async fn save<S: Storage>(&self, storage: &S, path: &str) -> Result<()> {
        let bytes = self.to_xlsx()?;
        storage.write_file(path, &bytes).await?;
        tracing::info!("💾 Saved workbook to {} ({} sheets)", path, self.sheets.len());
        Ok(())
    }

    pub fn sheets(&self) -> &[Table] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name).or_else(|| {
            let wanted = name.trim().to_lowercase();
            self.sheets
                .iter()
                .position(|s| s.name.trim().to_lowercase() == wanted)
        })
    }

    /// Exact name first, then case-insensitive and trimmed.
    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.position(name).map(|idx| &self.sheets[idx])
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.position(name).map(move |idx| &mut self.sheets[idx])
    }

    pub fn ensure_sheet(&mut self, name: &str, headers: &[&str]) -> &mut Table {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                tracing::info!("Creating sheet '{}'", name);
                self.sheets.push(Table::new(name, headers));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx]
    }

    pub fn missing_sheets(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.sheet(name).is_none())
            .cloned()
            .collect()
    }

    /// Serialises every sheet. Cell values survive, styling does not.
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let header_format = Format::new().set_bold();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");

        for table in &self.sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(&table.name)?;

            let mut row_idx: u32 = 0;
            for row in &table.preamble {
                write_row(sheet, row_idx, row, &date_format)?;
                row_idx += 1;
            }
            for (col, header) in table.raw_headers.iter().enumerate() {
                sheet.write_string_with_format(row_idx, col as u16, header, &header_format)?;
            }
            row_idx += 1;
            for row in &table.rows {
                write_row(sheet, row_idx, row, &date_format)?;
                row_idx += 1;
            }
        }

        Ok(workbook.save_to_buffer()?)
    }
}

fn write_row(
    sheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    cells: &[Cell],
    date_format: &Format,
) -> Result<()> {
    for (col, cell) in cells.iter().enumerate() {
        let col = col as u16;
        match cell {
            Cell::Empty => {}
            Cell::Text(s) => {
                sheet.write_string(row, col, s)?;
            }
            Cell::Number(n) => {
                sheet.write_number(row, col, *n)?;
            }
            Cell::Bool(b) => {
                sheet.write_boolean(row, col, *b)?;
            }
            Cell::Date(d) => {
                sheet.write_number_with_format(row, col, datetime_to_serial(*d), date_format)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_header_normalisation_and_aliases() {
        assert_eq!(normalize_header("  Opening   Stock "), "opening_stock");
        assert_eq!(normalize_header("Product"), "product_name");
        assert_eq!(normalize_header("Minimum Stock"), "min_stock");
        assert_eq!(normalize_header("Price"), "unit_price");
        assert_eq!(normalize_header("Value"), "stock_value");
        assert_eq!(normalize_header("Opening_Stock"), "opening_stock");
        assert_eq!(normalize_header("Output 0.5kg"), "output_0.5kg");
    }

    #[test]
    fn test_cell_coercion() {
        assert_eq!(Cell::text("1,250").as_f64(), Some(1250.0));
        assert_eq!(Cell::text("₹ 99.5").as_f64(), Some(99.5));
        assert_eq!(Cell::text("abc").as_f64(), None);
        assert_eq!(Cell::Number(12.6).as_i64(), Some(13));
        assert_eq!(Cell::Number(45000.0).as_text(), "45000");

        assert_eq!(Cell::text("2025-06-08").as_date(), Some(date(2025, 6, 8)));
        assert_eq!(Cell::text("08/06/2025").as_date(), Some(date(2025, 6, 8)));
        assert_eq!(Cell::text("2025-06-08T10:00:00").as_date(), Some(date(2025, 6, 8)));
        assert_eq!(Cell::Number(45816.0).as_date(), Some(date(2025, 6, 8)));
    }

    #[test]
    fn test_serial_round_trip() {
        let dt = date(2024, 2, 29).and_hms_opt(12, 0, 0).unwrap();
        let serial = datetime_to_serial(dt);
        assert!((serial - 45351.5).abs() < 1e-9);
        assert_eq!(serial_to_datetime(serial), Some(dt));
        assert_eq!(serial_to_datetime(0.0), None);
    }

    #[test]
    fn test_table_detects_header_and_skips_blank_rows() {
        let grid = vec![
            vec![Cell::Empty, Cell::Empty],
            vec![Cell::text("Product"), Cell::text("Opening Stock")],
            vec![Cell::text("0.5kg"), Cell::Number(10.0)],
            vec![Cell::Empty, Cell::text("  ")],
            vec![Cell::text("1.0kg"), Cell::Number(4.0)],
        ];
        let table = Table::from_rows("stock sheet", grid);

        assert_eq!(table.headers, vec!["product_name", "opening_stock"]);
        assert_eq!(table.preamble.len(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.int(1, "opening stock"), Some(4));
        assert_eq!(table.text(0, "product"), Some("0.5kg".to_string()));
        assert_eq!(table.sheet_row_number(1), 4);
    }

    #[test]
    fn test_append_record_adds_columns() {
        let mut table = Table::new("Sales_Log", &["Date", "Product"]);
        table.append_record(&[("Product", Cell::text("0.5kg")), ("Quantity", Cell::from(3i64))]);

        assert_eq!(table.raw_headers, vec!["Date", "Product", "Quantity"]);
        assert_eq!(table.int(0, "quantity"), Some(3));
        assert!(table.cell(0, 0).is_empty());
        assert!(table.set(5, "Quantity", Cell::Empty).is_err());
    }

    #[test]
    fn test_sheet_lookup_is_case_insensitive() {
        let workbook = Workbook::new(vec![Table::new("Stock Sheet ", &["Product"])]);
        assert!(workbook.sheet("stock sheet").is_some());
        assert_eq!(
            workbook.missing_sheets(&["stock sheet".to_string(), "Return".to_string()]),
            vec!["Return".to_string()]
        );
    }

    #[test]
    fn test_xlsx_round_trip_keeps_values() {
        let mut table = Table::new("stock sheet", &["Product", "Opening Stock", "Date"]);
        table.append_record(&[
            ("Product", Cell::text("0.5kg")),
            ("Opening Stock", Cell::from(25i64)),
            ("Date", Cell::from(date(2025, 6, 1))),
        ]);
        let workbook = Workbook::new(vec![table, Table::new("Return", &["Product", "Qty"])]);

        let bytes = workbook.to_xlsx().unwrap();
        let reread = Workbook::from_bytes(&bytes).unwrap();

        assert_eq!(reread.sheet_names(), vec!["stock sheet", "Return"]);
        let stock = reread.sheet("stock sheet").unwrap();
        assert_eq!(stock.int(0, "opening_stock"), Some(25));
        assert_eq!(stock.date(0, "date"), Some(date(2025, 6, 1)));
        assert!(reread.sheet("Return").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_bytes_fail_to_open() {
        assert!(Workbook::from_bytes(b"not a workbook").is_err());
    }
}
