use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};

fn seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Counters for one migrated target table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStats {
    pub source_table: String,
    pub source_rows: usize,
    pub filtered_foreign_keys: usize,
    pub failed_conversion: usize,
    pub filtered_required: usize,
    pub converted: usize,
    /// Rows handed to the loader.
    pub attempted: usize,
    pub loaded: usize,
    pub failed: usize,
    /// Rows silently skipped by a duplicate-tolerant insert.
    pub ignored_duplicates: usize,
    #[serde(serialize_with = "seconds")]
    pub duration: Duration,
    /// Set when the table aborted; the counters then cover only the steps that ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableStats {
    pub fn new(source_table: impl Into<String>, source_rows: usize) -> Self {
        Self {
            source_table: source_table.into(),
            source_rows,
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Rows that never reached the target, for reconciliation.
    pub fn dropped(&self) -> usize {
        self.filtered_foreign_keys + self.failed_conversion + self.filtered_required + self.failed
    }
}

/// Run-level statistics keyed by target table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatistics {
    pub tables: BTreeMap<String, TableStats>,
    /// Target tables in the order they were processed.
    pub order: Vec<String>,
    #[serde(serialize_with = "seconds")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub tables_migrated: usize,
    pub tables_failed: usize,
    pub rows_loaded: usize,
    pub rows_failed: usize,
}

impl MigrationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: &str, stats: TableStats) {
        if self.tables.insert(table.to_string(), stats).is_none() {
            self.order.push(table.to_string());
        }
    }

    pub fn get(&self, table: &str) -> Option<&TableStats> {
        self.tables.get(table)
    }

    /// Entries in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableStats)> {
        self.order
            .iter()
            .filter_map(|name| self.tables.get(name).map(|stats| (name.as_str(), stats)))
    }

    pub fn totals(&self) -> Totals {
        self.tables.values().fold(Totals::default(), |mut totals, stats| {
            if stats.is_failed() {
                totals.tables_failed += 1;
            } else {
                totals.tables_migrated += 1;
            }
            totals.rows_loaded += stats.loaded;
            totals.rows_failed += stats.failed;
            totals
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_split_failed_tables() {
        let mut stats = MigrationStatistics::new();
        let mut users = TableStats::new("users", 3);
        users.loaded = 2;
        users.failed = 1;
        stats.record("users", users);
        let mut hosts = TableStats::new("hosts", 4);
        hosts.error = Some("boom".into());
        stats.record("hosts", hosts);

        let totals = stats.totals();
        assert_eq!(totals.tables_migrated, 1);
        assert_eq!(totals.tables_failed, 1);
        assert_eq!(totals.rows_loaded, 2);
        assert_eq!(totals.rows_failed, 1);
        let order: Vec<_> = stats.iter().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["users", "hosts"]);
    }

    #[test]
    fn serializes_duration_as_seconds() {
        let mut table = TableStats::new("nodes", 1);
        table.duration = Duration::from_millis(1500);
        let json = serde_json::to_value(&table).expect("serialize");
        assert_eq!(json["duration"], serde_json::json!(1.5));
        assert!(json.get("error").is_none());
    }
}
