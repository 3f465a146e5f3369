use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::schema::TargetSchema;
use crate::value::{Row, Snapshot, Value};

/// How constraint violations are treated by an insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    #[default]
    Strict,
    /// Violating rows are skipped by the database without an error.
    IgnoreDuplicates,
}

/// Reads the source database.
#[async_trait]
pub trait SourceExtractor: Send {
    /// Every source table except `excluded`, keyed by table name. A table
    /// that fails to extract is returned empty.
    async fn extract_all_tables(&mut self, excluded: &BTreeSet<String>) -> Result<Snapshot>;

    /// Per-admin usage rows computed from per-user node usage.
    async fn extract_admin_usage_logs(&mut self) -> Result<Vec<Row>>;
}

/// Writes to and inspects the target database over one connection.
#[async_trait]
pub trait TargetStore: Send {
    /// Column metadata for every existing table.
    async fn introspect(&mut self) -> Result<TargetSchema>;

    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()>;

    async fn clear_table(&mut self, table: &str) -> Result<()>;

    /// Insert `rows` projected onto `columns` as one multi-row statement in
    /// one transaction, rolled back on error. Returns the number of rows the
    /// database reports as written.
    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<u64>;

    /// Every value of one column, used to refresh reference universes.
    async fn select_column(&mut self, table: &str, column: &str) -> Result<Vec<Value>>;

    async fn count_rows(&mut self, table: &str) -> Result<u64>;

    /// `(table, column)` pairs carrying an auto-increment counter.
    async fn auto_increment_columns(&mut self) -> Result<Vec<(String, String)>>;

    async fn max_id(&mut self, table: &str, column: &str) -> Result<Option<i64>>;

    async fn set_auto_increment(&mut self, table: &str, next: i64) -> Result<()>;

    /// Replace the stored schema revision marker with `version`.
    async fn set_alembic_version(&mut self, version: &str) -> Result<()>;

    /// Drop and re-open the underlying connection.
    async fn reconnect(&mut self) -> Result<()>;
}
