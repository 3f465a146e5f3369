use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use tracing::{error, info, warn};

use pasarport_core::{Result, Row, Snapshot, SourceExtractor};

use crate::connect::{connect, quote_ident, store_error};
use crate::decode::decode_row;
use crate::introspect::queries;

/// Append-only tables that may be capped to their newest rows.
pub const USAGE_TABLES: &[&str] = &[
    "node_user_usages",
    "node_usages",
    "admin_usage_logs",
    "user_usage_logs",
];

/// Usage tables at or below this size are always read in full.
pub const USAGE_CAP_THRESHOLD: u64 = 100_000;

pub const DEFAULT_MAX_USAGE_ROWS: u64 = 100_000;

const ADMIN_USAGE_QUERY: &str = r#"
    SELECT
      u.admin_id AS admin_id,
      CAST(SUM(nuu.used_traffic) AS SIGNED) AS used_traffic,
      MAX(nuu.created_at) AS created_at
    FROM node_user_usages nuu
    JOIN users u ON u.id = nuu.user_id
    WHERE u.admin_id IS NOT NULL
    GROUP BY u.admin_id
    ORDER BY u.admin_id
"#;

/// Reads the Marzneshin database over one connection.
#[derive(Debug)]
pub struct MySqlSourceExtractor {
    conn: MySqlConnection,
    /// Newest-row cap for large usage tables; 0 disables it.
    max_usage_rows: u64,
}

impl MySqlSourceExtractor {
    pub async fn connect(options: &MySqlConnectOptions, label: &str) -> Result<Self> {
        let conn = connect(options, label).await?;
        Ok(Self {
            conn,
            max_usage_rows: DEFAULT_MAX_USAGE_ROWS,
        })
    }

    pub fn with_max_usage_rows(mut self, max_usage_rows: u64) -> Self {
        self.max_usage_rows = max_usage_rows;
        self
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(store_error)
    }

    /// Source tables minus `excluded`.
    pub async fn discover_tables(&mut self, excluded: &BTreeSet<String>) -> Result<Vec<String>> {
        let tables: Vec<String> = queries::list_tables(&mut self.conn)
            .await?
            .into_iter()
            .filter(|table| !excluded.contains(table))
            .collect();
        info!(tables = tables.len(), names = %tables.join(", "), "source tables discovered");
        Ok(tables)
    }

    pub async fn extract_table(&mut self, table: &str) -> Result<Vec<Row>> {
        let started = Instant::now();
        let columns = queries::table_column_names(&mut self.conn, table).await?;
        if columns.is_empty() {
            warn!(table = %table, "table has no columns");
            return Ok(Vec::new());
        }

        let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(store_error)?;
        let total = u64::try_from(total).unwrap_or(0);

        let sql = select_sql(table, &columns, total, self.max_usage_rows);
        if sql.capped {
            warn!(
                table = %table,
                total,
                kept = self.max_usage_rows,
                "large usage table limited to its most recent rows"
            );
        }

        let rows = sqlx::query(&sql.text)
            .fetch_all(&mut self.conn)
            .await
            .map_err(store_error)?;
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        info!(
            table = %table,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "table extracted"
        );
        Ok(rows)
    }
}

struct SelectSql {
    text: String,
    capped: bool,
}

fn select_sql(table: &str, columns: &[String], total: u64, max_usage_rows: u64) -> SelectSql {
    let list = columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!("SELECT {list} FROM {}", quote_ident(table));
    let has = |name: &str| columns.iter().any(|column| column == name);

    let capped = USAGE_TABLES.contains(&table)
        && total > USAGE_CAP_THRESHOLD
        && has("created_at")
        && max_usage_rows > 0
        && max_usage_rows < total;
    if capped {
        text.push_str(&format!(" ORDER BY `created_at` DESC LIMIT {max_usage_rows}"));
    } else if has("id") {
        text.push_str(" ORDER BY `id`");
    }
    SelectSql { text, capped }
}

#[async_trait]
impl SourceExtractor for MySqlSourceExtractor {
    async fn extract_all_tables(&mut self, excluded: &BTreeSet<String>) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for table in self.discover_tables(excluded).await? {
            let rows = match self.extract_table(&table).await {
                Ok(rows) => rows,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    error!(table = %table, error = %err, "extraction failed, continuing with no rows");
                    Vec::new()
                }
            };
            snapshot.insert(table, rows);
        }
        Ok(snapshot)
    }

    async fn extract_admin_usage_logs(&mut self) -> Result<Vec<Row>> {
        let rows = sqlx::query(ADMIN_USAGE_QUERY)
            .fetch_all(&mut self.conn)
            .await
            .map_err(store_error)?;
        rows.iter().map(decode_row).collect()
    }
}
