//! Quick HTML profile

use crate::types::Dataset;

const MAX_PROFILE_COLUMNS: usize = 20;

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render rows, columns and per-column type and missing counts as HTML
pub fn profile_html(dataset: &Dataset) -> String {
    let mut html = vec![
        "<html><body><h1>Quick Profile</h1>".to_string(),
        format!(
            "<p>Rows: {} Columns: {}</p>",
            dataset.n_rows(),
            dataset.n_cols()
        ),
        "<h2>Top columns</h2><ul>".to_string(),
    ];

    for column in dataset.columns().iter().take(MAX_PROFILE_COLUMNS) {
        html.push(format!(
            "<li>{} - {} - missing: {}</li>",
            escape_html(&column.name),
            column.kind().as_str(),
            column.missing_count()
        ));
    }

    html.push("</ul></body></html>".to_string());
    html.join("\n")
}
