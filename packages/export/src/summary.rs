//! Rendered summary table: latest value and trend per indicator, grouped
//! by category.

use std::collections::BTreeMap;

use macro_db_database_models::LatestObservation;

/// Direction of the latest value relative to the prior period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    /// Higher than the prior period.
    Up,
    /// Lower than the prior period.
    Down,
    /// Unchanged.
    Flat,
    /// No prior period stored.
    Unknown,
}

impl Trend {
    /// Compares `latest` against `previous`.
    #[must_use]
    pub fn between(latest: f64, previous: Option<f64>) -> Self {
        match previous {
            None => Self::Unknown,
            Some(previous) if latest > previous => Self::Up,
            Some(previous) if latest < previous => Self::Down,
            Some(_) => Self::Flat,
        }
    }

    /// Arrow shown in the table.
    #[must_use]
    pub const fn arrow(self) -> &'static str {
        match self {
            Self::Up => "▲",
            Self::Down => "▼",
            Self::Flat => "▶",
            Self::Unknown => "·",
        }
    }

    const fn class(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Flat => "flat",
            Self::Unknown => "none",
        }
    }
}

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Belgian Macro Data</title>
<style>
body { font-family: Arial, sans-serif; font-size: 13px; }
table { border-collapse: collapse; width: 100%; margin-bottom: 24px; }
th, td { border: 1px solid #ddd; padding: 6px 8px; }
th { background-color: #4da6ff; color: white; text-align: left; }
td.num { text-align: right; }
.up { color: #2e7d32; }
.down { color: #c62828; }
.flat, .none { color: #777; }
</style>
</head>
<body>
<h1>Belgian Macro Data</h1>
"#;

const TAIL: &str = "</body>\n</html>\n";

/// Renders the latest observations as an HTML page with one table per
/// category, categories and indicators in sorted order.
#[must_use]
pub fn summary_html(latest: &[LatestObservation]) -> String {
    let mut by_category: BTreeMap<&str, Vec<&LatestObservation>> = BTreeMap::new();
    for entry in latest {
        by_category
            .entry(entry.row.category.as_str())
            .or_default()
            .push(entry);
    }

    let mut html = String::from(HEAD);
    if by_category.is_empty() {
        html.push_str("<p>No observations stored.</p>\n");
    }
    for (category, mut entries) in by_category {
        entries.sort_by(|a, b| a.row.indicator_code.cmp(&b.row.indicator_code));

        html.push_str(&format!("<h2>{}</h2>\n", escape(category)));
        html.push_str("<table>\n<tr><th>Indicator</th><th>Period</th><th>Value</th><th>Unit</th><th>Trend</th></tr>\n");
        for entry in entries {
            let row = &entry.row;
            let trend = Trend::between(row.value, entry.previous_value);
            html.push_str(&format!(
                "<tr><td title=\"{code}\">{name}</td><td>{period}</td><td class=\"num\">{value:.2}</td><td>{unit}</td><td class=\"{class}\">{arrow}</td></tr>\n",
                code = escape(&row.indicator_code),
                name = escape(&row.display_name),
                period = escape(&row.period),
                value = row.value,
                unit = escape(row.unit.as_str()),
                class = trend.class(),
                arrow = trend.arrow(),
            ));
        }
        html.push_str("</table>\n");
    }
    html.push_str(TAIL);
    html
}

/// Escapes text for use in HTML content and double-quoted attributes.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_store;

    #[test]
    fn trend_compares_with_prior_period() {
        assert_eq!(Trend::between(2.0, Some(1.0)), Trend::Up);
        assert_eq!(Trend::between(0.5, Some(1.0)), Trend::Down);
        assert_eq!(Trend::between(1.0, Some(1.0)), Trend::Flat);
        assert_eq!(Trend::between(1.0, None), Trend::Unknown);
        assert_eq!(Trend::Up.arrow(), "▲");
        assert_eq!(Trend::Down.arrow(), "▼");
        assert_eq!(Trend::Flat.arrow(), "▶");
        assert_eq!(Trend::Unknown.arrow(), "·");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape(r#"<b>"R&D" 'x'</b>"#),
            "&lt;b&gt;&quot;R&amp;D&quot; &#39;x&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn sections_are_sorted_by_category() {
        let store = sample_store();
        let html = summary_html(&store.latest_observations().unwrap());

        let confidence = html.find("<h2>Confidence</h2>").unwrap();
        let gdp = html.find("<h2>GDP</h2>").unwrap();
        assert!(confidence < gdp);

        // A went from -0.25 to 1.5; B has a single period.
        assert!(html.contains("<td>2021</td><td class=\"num\">1.50</td><td>percent_yy</td><td class=\"up\">▲</td>"));
        assert!(html.contains("<td class=\"none\">·</td>"));
        assert!(html.contains("Beta &amp; &lt;Co&gt;"));
        assert!(!html.contains("<Co>"));
    }

    #[test]
    fn empty_store_renders_placeholder() {
        let html = summary_html(&[]);
        assert!(html.contains("No observations stored."));
        assert!(html.ends_with("</html>\n"));
    }
}
