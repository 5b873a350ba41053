use crate::config::APP_NAME;
use crate::utils::format::escape_html;
use axum::response::Html;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Success,
    Warning,
    Error,
    Info,
}

impl Banner {
    fn colors(&self) -> (&'static str, &'static str, &'static str) {
        // (background, border, text)
        match self {
            Self::Success => ("#d4edda", "#28a745", "#155724"),
            Self::Warning => ("#fff3cd", "#ffc107", "#856404"),
            Self::Error => ("#f8d7da", "#dc3545", "#721c24"),
            Self::Info => ("#d1ecf1", "#17a2b8", "#0c5460"),
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Info => "ℹ️",
        }
    }
}

/// A coloured message box; `details` become a bullet list.
pub fn banner(kind: Banner, message: &str, details: &[String]) -> String {
    let (background, border, color) = kind.colors();
    let mut out = format!(
        "<div class=\"banner\" style=\"background:{};border-left:4px solid {};color:{}\">{} {}",
        background,
        border,
        color,
        kind.icon(),
        escape_html(message)
    );
    if !details.is_empty() {
        out.push_str("<ul>");
        for detail in details {
            out.push_str(&format!("<li>{}</li>", escape_html(detail)));
        }
        out.push_str("</ul>");
    }
    out.push_str("</div>");
    out
}

const NAV: [(&str, &str); 4] = [
    ("/", "Dashboard"),
    ("/entry", "Data Entry"),
    ("/reports", "Reports"),
    ("/backups", "Backups"),
];

pub fn layout(title: &str, active: &str, body: &str) -> Html<String> {
    let nav: String = NAV
        .iter()
        .map(|(href, label)| {
            let class = if *href == active { " class=\"active\"" } else { "" };
            format!("<a href=\"{}\"{}>{}</a>", href, class, label)
        })
        .collect();

    Html(format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title} - {app}</title><style>{css}</style></head>\
         <body><header><h1>📦 {app}</h1><nav>{nav}</nav></header>\
         <main><h2>{title}</h2>{body}</main></body></html>",
        title = escape_html(title),
        app = APP_NAME,
        css = CSS,
        nav = nav,
        body = body,
    ))
}

const CSS: &str = "body{font-family:Arial,sans-serif;margin:0;background:#f5f6fa;color:#222}\
header{background:#1f4e78;color:#fff;padding:12px 24px}header h1{margin:0 0 8px;font-size:20px}\
nav a{color:#cfe2f3;margin-right:16px;text-decoration:none}nav a.active{color:#fff;font-weight:bold}\
main{padding:16px 24px}.banner{padding:10px 14px;margin:10px 0;border-radius:4px}\
.cards{display:flex;flex-wrap:wrap;gap:12px}.card{background:#fff;border-radius:6px;padding:12px 16px;\
min-width:160px;box-shadow:0 1px 3px rgba(0,0,0,.1)}.card .value{font-size:22px;font-weight:bold}\
table{border-collapse:collapse;background:#fff;margin:8px 0 20px;font-size:13px}\
th{background:#1f4e78;color:#fff;text-align:left}th,td{border:1px solid #ddd;padding:5px 8px}\
td.num{text-align:right}.status{padding:2px 6px;border-radius:3px;color:#fff;font-size:12px}\
form.entry{background:#fff;padding:12px 16px;margin-bottom:20px;border-radius:6px}\
form.entry label{display:inline-block;width:180px}form.entry div{margin:4px 0}\
.bar{background:#4a90d9;height:10px;display:inline-block}";

/// Escapes every cell; `numeric` columns are right-aligned.
pub fn table(headers: &[&str], rows: &[Vec<String>], numeric: &[usize]) -> String {
    let mut out = String::from("<table><thead><tr>");
    for header in headers {
        out.push_str(&format!("<th>{}</th>", escape_html(header)));
    }
    out.push_str("</tr></thead><tbody>");
    for row in rows {
        out.push_str("<tr>");
        for (idx, cell) in row.iter().enumerate() {
            if numeric.contains(&idx) {
                out.push_str(&format!("<td class=\"num\">{}</td>", escape_html(cell)));
            } else {
                out.push_str(&format!("<td>{}</td>", escape_html(cell)));
            }
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}

pub fn card(label: &str, value: &str) -> String {
    format!(
        "<div class=\"card\"><div>{}</div><div class=\"value\">{}</div></div>",
        escape_html(label),
        escape_html(value)
    )
}

pub fn status_badge(label: &str, color: &str) -> String {
    format!(
        "<span class=\"status\" style=\"background:{}\">{}</span>",
        color,
        escape_html(label)
    )
}

pub fn select(name: &str, options: &[String], required: bool) -> String {
    let mut out = format!(
        "<select name=\"{}\"{}><option value=\"\"></option>",
        escape_html(name),
        if required { " required" } else { "" }
    );
    for option in options {
        let escaped = escape_html(option);
        out.push_str(&format!("<option value=\"{0}\">{0}</option>", escaped));
    }
    out.push_str("</select>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_escapes_details() {
        let html = banner(Banner::Error, "Failed", &["<script>".to_string()]);
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("#f8d7da"));
    }

    #[test]
    fn test_layout_marks_active_link() {
        let Html(page) = layout("Reports", "/reports", "");
        assert!(page.contains("<a href=\"/reports\" class=\"active\">Reports</a>"));
    }
}
