use regex::Regex;
use std::sync::OnceLock;

use crate::diagram::{DiagramContent, DiagramRecord};
use crate::*;

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::new();
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("color pattern compiles")
    })
}

/// `#rgb` or `#rrggbb`.
pub fn is_valid_color(value: &str) -> bool {
    color_pattern().is_match(value)
}

/// Reads a stored diagram document. Accepts either a full record (as served
/// by the API) or a bare `{nodes, connections}` body, and checks the
/// diagram invariants before handing it back.
pub fn parse_diagram_document(source: &str) -> Result<(Option<String>, DiagramContent)> {
    let value: serde_json::Value =
        serde_json::from_str(source).context("diagram document is not valid JSON")?;

    let (name, content) = if value.get("owner").is_some() && value.get("id").is_some() {
        let record: DiagramRecord =
            serde_json::from_value(value).context("failed to parse diagram record")?;
        (Some(record.name), record.content)
    } else {
        let content: DiagramContent =
            serde_json::from_value(value).context("failed to parse diagram body")?;
        (None, content)
    };

    content.validate()?;
    Ok((name, content))
}
