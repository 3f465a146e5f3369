use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use pasarport_core::{InsertMode, Result, Row, TargetStore};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Row-level errors logged in full per table; later ones go to debug.
const LOGGED_ROW_ERRORS: usize = 3;

/// Counts returned by [`BatchLoader::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// Rows the database skipped under [`InsertMode::IgnoreDuplicates`].
    /// Counted in `succeeded` as well.
    pub ignored: usize,
}

impl LoadOutcome {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    fn absorb(&mut self, other: LoadOutcome) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.ignored += other.ignored;
    }
}

/// Inserts rows in fixed-size multi-row batches with a row-by-row fallback.
#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load `rows` into `table`.
    ///
    /// Row failures are counted, never returned. Only errors the store marks
    /// fatal (lost connection) end the load early.
    pub async fn load<T>(
        &self,
        store: &mut T,
        table: &str,
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<LoadOutcome>
    where
        T: TargetStore + ?Sized,
    {
        let mut outcome = LoadOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        let mut row_errors = 0;
        let batches = rows.len().div_ceil(self.batch_size);
        for (index, batch) in rows.chunks(self.batch_size).enumerate() {
            // Rows in one statement must share a column list.
            for (columns, group) in group_by_columns(batch) {
                let result = self
                    .load_group(store, table, &columns, &group, mode, &mut row_errors)
                    .await?;
                outcome.absorb(result);
            }
            debug!(
                table = %table,
                batch = index + 1,
                batches,
                loaded = outcome.succeeded,
                failed = outcome.failed,
                "batch finished"
            );
        }

        if row_errors > LOGGED_ROW_ERRORS {
            warn!(
                table = %table,
                suppressed = row_errors - LOGGED_ROW_ERRORS,
                "further row errors logged at debug level"
            );
        }
        info!(
            table = %table,
            loaded = outcome.succeeded,
            failed = outcome.failed,
            ignored = outcome.ignored,
            "table loaded"
        );
        Ok(outcome)
    }

    async fn load_group<T>(
        &self,
        store: &mut T,
        table: &str,
        columns: &[String],
        rows: &[Row],
        mode: InsertMode,
        row_errors: &mut usize,
    ) -> Result<LoadOutcome>
    where
        T: TargetStore + ?Sized,
    {
        match store.insert_rows(table, columns, rows, mode).await {
            Ok(written) => Ok(written_outcome(rows.len(), written, mode)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(
                    table = %table,
                    rows = rows.len(),
                    error = %err,
                    "batch insert failed, retrying row by row"
                );
                let mut outcome = LoadOutcome::default();
                for (offset, row) in rows.iter().enumerate() {
                    match store
                        .insert_rows(table, columns, std::slice::from_ref(row), mode)
                        .await
                    {
                        Ok(written) => outcome.absorb(written_outcome(1, written, mode)),
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            outcome.failed += 1;
                            *row_errors += 1;
                            if *row_errors <= LOGGED_ROW_ERRORS {
                                warn!(table = %table, row = offset + 1, error = %err, "row insert failed");
                            } else {
                                debug!(table = %table, row = offset + 1, error = %err, "row insert failed");
                            }
                        }
                    }
                }
                Ok(outcome)
            }
        }
    }
}

fn written_outcome(sent: usize, written: u64, mode: InsertMode) -> LoadOutcome {
    let written = usize::try_from(written).unwrap_or(usize::MAX).min(sent);
    let ignored = match mode {
        InsertMode::IgnoreDuplicates => sent - written,
        InsertMode::Strict => 0,
    };
    LoadOutcome {
        succeeded: sent,
        failed: 0,
        ignored,
    }
}

/// Split a batch into runs of rows with identical column sets, in first-seen
/// order. Columns absent from a row keep their database default.
fn group_by_columns(batch: &[Row]) -> Vec<(Vec<String>, Vec<Row>)> {
    let mut groups: Vec<(Vec<String>, Vec<Row>)> = Vec::new();
    let mut index: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    for row in batch {
        let columns: Vec<String> = row.keys().cloned().collect();
        match index.get(&columns) {
            Some(&slot) => groups[slot].1.push(row.clone()),
            None => {
                index.insert(columns.clone(), groups.len());
                groups.push((columns, vec![row.clone()]));
            }
        }
    }
    groups
}
