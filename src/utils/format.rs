use chrono::NaiveDate;

pub const CURRENCY_SYMBOL: &str = "₹";

/// 印度式千分位：最後三位一組，其餘兩位一組 (1,23,45,678)
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    if !rest.is_empty() {
        groups.push(rest);
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

pub fn currency(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    format!("{}{}{}.{}", sign, CURRENCY_SYMBOL, group_indian(whole), fraction)
}

/// Lakh/crore abbreviations for KPI cards.
pub fn currency_compact(amount: f64) -> String {
    let abs = amount.abs();
    if abs >= 10_000_000.0 {
        format!("{}{:.1}Cr", CURRENCY_SYMBOL, amount / 10_000_000.0)
    } else if abs >= 100_000.0 {
        format!("{}{:.1}L", CURRENCY_SYMBOL, amount / 100_000.0)
    } else if abs >= 1_000.0 {
        format!("{}{:.1}K", CURRENCY_SYMBOL, amount / 1_000.0)
    } else {
        format!("{}{:.2}", CURRENCY_SYMBOL, amount)
    }
}

pub fn number(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    format!("{}{}", sign, group_indian(&value.unsigned_abs().to_string()))
}

pub fn percentage(value: f64) -> String {
    format!("{:.1}%", value)
}

pub fn file_size(size_bytes: u64) -> String {
    let units = ["KB", "MB", "GB", "TB"];
    if size_bytes < 1024 {
        return format!("{} B", size_bytes);
    }
    let mut size = size_bytes as f64 / 1024.0;
    for unit in units {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

/// "0.5kg", "1.0kg"
pub fn weight_label(weight_kg: f64) -> String {
    if weight_kg.fract() == 0.0 {
        format!("{:.1}kg", weight_kg)
    } else {
        format!("{}kg", weight_kg)
    }
}

pub fn product_code(weight_kg: f64, category: &str) -> String {
    let label = weight_label(weight_kg);
    format!("{}_{}", category, label.trim_end_matches("kg")).to_uppercase() + "KG"
}

pub fn batch_number(date: NaiveDate, sequence: u32) -> String {
    format!("BATCH-{}-{:03}", date.format("%Y%m%d"), sequence)
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// 產生安全的檔名片段
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_uses_indian_grouping() {
        assert_eq!(currency(1234567.891), "₹12,34,567.89");
        assert_eq!(currency(999.5), "₹999.50");
        assert_eq!(currency(-1500.0), "-₹1,500.00");
    }

    #[test]
    fn test_currency_compact() {
        assert_eq!(currency_compact(250_000.0), "₹2.5L");
        assert_eq!(currency_compact(45_000.0), "₹45.0K");
        assert_eq!(currency_compact(12_000_000.0), "₹1.2Cr");
        assert_eq!(currency_compact(20.0), "₹20.00");
    }

    #[test]
    fn test_weight_labels_and_codes() {
        assert_eq!(weight_label(0.5), "0.5kg");
        assert_eq!(weight_label(2.0), "2.0kg");
        assert_eq!(product_code(1.5, "RC"), "RC_1.5KG");
        assert_eq!(product_code(1.0, "rc"), "RC_1.0KG");
    }

    #[test]
    fn test_batch_number() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        assert_eq!(batch_number(date, 7), "BATCH-20250608-007");
    }

    #[test]
    fn test_file_size_and_number() {
        assert_eq!(file_size(512), "512 B");
        assert_eq!(file_size(2048), "2.0 KB");
        assert_eq!(number(100000), "1,00,000");
        assert_eq!(number(-42), "-42");
    }

    #[test]
    fn test_escape_and_sanitize() {
        assert_eq!(escape_html("<b>\"x\"</b>"), "&lt;b&gt;&quot;x&quot;&lt;/b&gt;");
        assert_eq!(sanitize_filename("Stock Report/June"), "Stock_Report_June");
        assert_eq!(sanitize_filename(".."), "unnamed");
    }
}
