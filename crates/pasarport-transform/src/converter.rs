use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use pasarport_core::{
    MappingRules, PassThrough, Resolution, Row, Snapshot, TableColumns, UniquenessLedger, Value,
    coerce_row, row_id,
};

use crate::computed::apply_computed;
use crate::core_config::build_core_config;
use crate::errors::TransformError;
use crate::required::{RequiredOutcome, validate_required};
use crate::transforms::{self, TransformContext};

/// Converted rows for one table plus the number of rows that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOutcome {
    pub rows: Vec<Row>,
    pub failed: usize,
}

/// Turns source rows into target rows. Owns the run's uniqueness ledger.
#[derive(Debug, Clone, Default)]
pub struct RowTransformer {
    rules: MappingRules,
    ledger: UniquenessLedger,
    source_inbound_tags: BTreeMap<i64, String>,
    warned: BTreeSet<(String, String)>,
}

impl RowTransformer {
    pub fn new(rules: MappingRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Remember source inbound tags so hosts can still be tagged when their
    /// inbound never went through tag resolution.
    pub fn with_snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.source_inbound_tags = snapshot
            .get("inbounds")
            .into_iter()
            .flatten()
            .filter_map(|row| {
                let id = row_id(row)?;
                let tag = row.get("tag").and_then(Value::render)?;
                Some((id, tag))
            })
            .collect();
        self
    }

    pub fn ledger(&self) -> &UniquenessLedger {
        &self.ledger
    }

    /// Convert every row for `table`. Failing rows are logged and skipped.
    pub fn convert_table(
        &mut self,
        table: &str,
        rows: &[Row],
        columns: &TableColumns,
    ) -> ConversionOutcome {
        info!(table = %table, rows = rows.len(), "converting rows");
        let mut outcome = ConversionOutcome::default();
        for (idx, row) in rows.iter().enumerate() {
            match self.convert_row(table, row, columns) {
                Ok(converted) => outcome.rows.push(converted),
                Err(err) => {
                    outcome.failed += 1;
                    warn!(table = %table, row = idx + 1, error = %err, "row conversion failed");
                }
            }
        }
        info!(
            table = %table,
            converted = outcome.rows.len(),
            failed = outcome.failed,
            "conversion finished"
        );
        outcome
    }

    pub fn convert_row(
        &mut self,
        table: &str,
        source: &Row,
        columns: &TableColumns,
    ) -> Result<Row, TransformError> {
        let converted = if table == "core_configs" {
            build_core_config(source, &mut self.ledger)?
        } else {
            let mut mapped = self.map_columns(table, source, columns);
            apply_computed(table, source, &mut mapped, &mut self.ledger);
            mapped
        };
        Ok(coerce_row(table, converted, columns))
    }

    pub fn validate_required(
        &mut self,
        table: &str,
        rows: Vec<Row>,
        columns: &TableColumns,
    ) -> RequiredOutcome {
        validate_required(table, rows, columns, &mut self.ledger)
    }

    fn map_columns(&mut self, table: &str, source: &Row, columns: &TableColumns) -> Row {
        let mut mapped = Row::new();
        for (column, value) in source {
            match self.rules.resolve(table, column) {
                Resolution::Drop => {}
                Resolution::Map { target, transform } => {
                    let value = match transform {
                        Some(transform) => {
                            let ctx = TransformContext {
                                source_row: source,
                                ledger: &self.ledger,
                                source_inbound_tags: &self.source_inbound_tags,
                            };
                            transforms::apply(transform, value, &ctx)
                        }
                        None => value.clone(),
                    };
                    mapped.insert(target.to_string(), value);
                }
                Resolution::Identity(reason) => {
                    if columns.contains_key(column.as_str()) {
                        self.note_pass_through(table, column, reason);
                    }
                    mapped
                        .entry(column.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
        mapped
    }

    fn note_pass_through(&mut self, table: &str, column: &str, reason: PassThrough) {
        if !self.warned.insert((table.to_string(), column.to_string())) {
            return;
        }
        match reason {
            PassThrough::NoRuleSet => {
                debug!(table = %table, column = %column, "table has no rule set, copying column");
            }
            PassThrough::UndeclaredColumn => warn!(
                table = %table,
                column = %column,
                "column has no mapping rule, copying it unchanged"
            ),
        }
    }
}
