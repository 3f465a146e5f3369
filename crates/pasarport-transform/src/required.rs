use tracing::{info, warn};

use pasarport_core::{Namespace, Row, TableColumns, UniquenessLedger, Value};

/// Rows that passed the required-field check and how many were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiredOutcome {
    pub kept: Vec<Row>,
    pub dropped: usize,
}

/// Drop rows missing a value for any NOT NULL column that has no default.
///
/// A missing `core_configs.name` is replaced by a generated
/// `core_config_<n>` instead of dropping the row.
pub fn validate_required(
    table: &str,
    rows: Vec<Row>,
    columns: &TableColumns,
    ledger: &mut UniquenessLedger,
) -> RequiredOutcome {
    let required: Vec<&str> = columns
        .values()
        .filter(|column| column.is_required())
        .map(|column| column.name.as_str())
        .collect();
    if required.is_empty() {
        return RequiredOutcome {
            kept: rows,
            dropped: 0,
        };
    }

    let total = rows.len();
    let mut kept = Vec::with_capacity(total);
    for mut row in rows {
        let mut valid = true;
        for column in &required {
            if !row.get(*column).is_none_or(Value::is_blank) {
                continue;
            }
            if table == "core_configs" && *column == "name" {
                let fallback = ledger.resolve(
                    Namespace::CoreConfigName,
                    &format!("core_config_{}", kept.len() + 1),
                );
                warn!(table = %table, name = %fallback, "generated fallback name");
                row.insert("name".into(), Value::Text(fallback));
                continue;
            }
            warn!(table = %table, column = %column, "row missing required field");
            valid = false;
            break;
        }
        if valid {
            kept.push(row);
        }
    }

    let dropped = total - kept.len();
    if dropped > 0 {
        info!(table = %table, dropped, "filtered rows missing required fields");
    }
    RequiredOutcome { kept, dropped }
}
