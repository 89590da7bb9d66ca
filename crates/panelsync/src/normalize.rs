use panelsync_models::DataTable;
use serde_json::{Map, Value};

/// The composite quote column: a brace-wrapped, comma-separated list of up
/// to four `label: value` entries, values written with decimal commas.
const COMPOSITE_FIELD: &str = "puntas";

const MAX_QUOTE_ENTRIES: usize = 4;

/// Source columns with no use downstream, removed after normalization.
/// Columns that are not present are skipped silently.
const DROPPED_COLUMNS: [&str; 5] = [
    "puntas",
    "precioEjercicio",
    "tipoOpcion",
    "fechaVencimiento",
    "mercado",
];

/// Normalize every row in place. Total: malformed composite input degrades
/// to absent values, it never fails the row or the table.
pub fn normalize_table(table: &mut DataTable) {
    if !table.is_empty() && !table.rows().iter().any(|r| r.contains_key(COMPOSITE_FIELD)) {
        tracing::warn!("No '{COMPOSITE_FIELD}' column found in table");
    }
    for row in table.rows_mut() {
        normalize_row(row);
    }
}

/// Split the composite field into `puntas_1`..`puntas_4` numeric columns
/// (number or null), then drop the redundant source columns.
pub fn normalize_row(row: &mut Map<String, Value>) {
    if let Some(raw) = row.get(COMPOSITE_FIELD).map(value_text) {
        for (idx, parsed) in split_composite(&raw).iter().enumerate() {
            let cell = parsed
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            row.insert(format!("{COMPOSITE_FIELD}_{}", idx + 1), cell);
        }
    }

    for column in DROPPED_COLUMNS {
        row.remove(column);
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// At most four positional entries; an entry yields a value only when it
/// contains a `": "` separator. The last entry may carry the closing brace.
fn split_composite(raw: &str) -> [Option<f64>; MAX_QUOTE_ENTRIES] {
    let mut values = [None; MAX_QUOTE_ENTRIES];
    let tokens: Vec<&str> = raw.split(", ").take(MAX_QUOTE_ENTRIES).collect();
    let last = tokens.len().saturating_sub(1);

    for (idx, token) in tokens.iter().enumerate() {
        let token = if idx == last {
            token.strip_suffix('}').unwrap_or(token)
        } else {
            token
        };
        if let Some((_label, value)) = token.split_once(": ") {
            values[idx] = coerce_number(value);
        }
    }

    values
}

/// Locale-aware numeric coercion: empty text and not-a-value markers are
/// absent, decimal commas become decimal points, and anything that still
/// fails to parse is absent rather than an error.
fn coerce_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "nan" | "none" | "null" | "-"
    ) {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}
