use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection};
use sqlx::{Column, Connection, QueryBuilder, Row as _, TypeInfo};
use tracing::{debug, warn};

use pasarport_core::{InsertMode, Result, Row, TargetSchema, TargetStore, Value};

use crate::connect::{connect, quote_ident, store_error};
use crate::decode::{decode_column, push_bind_value};
use crate::introspect::{self, queries};

/// Writes to the PasarGuard database over one connection.
#[derive(Debug)]
pub struct MySqlTargetStore {
    conn: MySqlConnection,
    options: MySqlConnectOptions,
    label: String,
}

impl MySqlTargetStore {
    pub async fn connect(options: MySqlConnectOptions, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let conn = connect(&options, &label).await?;
        Ok(Self {
            conn,
            options,
            label,
        })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(store_error)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(store_error)?;
        Ok(done.rows_affected())
    }
}

fn insert_builder<'args>(
    table: &str,
    columns: &[String],
    rows: &'args [Row],
    mode: InsertMode,
) -> QueryBuilder<'args, MySql> {
    let verb = match mode {
        InsertMode::Strict => "INSERT INTO ",
        InsertMode::IgnoreDuplicates => "INSERT IGNORE INTO ",
    };
    let column_list = columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder = QueryBuilder::new(verb);
    builder.push(quote_ident(table));
    builder.push(format!(" ({column_list}) "));
    builder.push_values(rows, |mut tuple, row| {
        for column in columns {
            push_bind_value(&mut tuple, row.get(column));
        }
    });
    builder
}

#[async_trait]
impl TargetStore for MySqlTargetStore {
    async fn introspect(&mut self) -> Result<TargetSchema> {
        introspect::introspect(&mut self.conn).await
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        queries::table_exists(&mut self.conn, table).await
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        let flag = if enabled { 1 } else { 0 };
        self.execute(&format!("SET FOREIGN_KEY_CHECKS = {flag}"))
            .await?;
        debug!(enabled, "foreign key checks toggled");
        Ok(())
    }

    async fn clear_table(&mut self, table: &str) -> Result<()> {
        self.execute(&format!("TRUNCATE TABLE {}", quote_ident(table)))
            .await?;
        debug!(table = %table, "table truncated");
        Ok(())
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }
        let mut builder = insert_builder(table, columns, rows, mode);

        let mut tx = self.conn.begin().await.map_err(store_error)?;
        match builder.build().execute(&mut *tx).await {
            Ok(done) => {
                tx.commit().await.map_err(store_error)?;
                Ok(done.rows_affected())
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(table = %table, error = %rollback, "rollback failed");
                }
                Err(store_error(err))
            }
        }
    }

    async fn select_column(&mut self, table: &str, column: &str) -> Result<Vec<Value>> {
        let sql = format!("SELECT {} FROM {}", quote_ident(column), quote_ident(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(store_error)?;
        rows.iter()
            .map(|row| {
                let type_name = row
                    .columns()
                    .first()
                    .map(|column| column.type_info().name())
                    .unwrap_or("TEXT");
                decode_column(row, 0, type_name)
            })
            .collect()
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(store_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn auto_increment_columns(&mut self) -> Result<Vec<(String, String)>> {
        queries::list_auto_increment_columns(&mut self.conn).await
    }

    async fn max_id(&mut self, table: &str, column: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT CAST(MAX({}) AS SIGNED) FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        sqlx::query_scalar::<_, Option<i64>>(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(store_error)
    }

    async fn set_auto_increment(&mut self, table: &str, next: i64) -> Result<()> {
        self.execute(&format!(
            "ALTER TABLE {} AUTO_INCREMENT = {next}",
            quote_ident(table)
        ))
        .await?;
        Ok(())
    }

    async fn set_alembic_version(&mut self, version: &str) -> Result<()> {
        let mut tx = self.conn.begin().await.map_err(store_error)?;
        sqlx::query("DELETE FROM alembic_version")
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query("INSERT INTO alembic_version (version_num) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)
    }

    async fn reconnect(&mut self) -> Result<()> {
        let fresh = connect(&self.options, &self.label).await?;
        let stale = std::mem::replace(&mut self.conn, fresh);
        if let Err(err) = stale.close().await {
            debug!(error = %err, "closing stale connection failed");
        }
        Ok(())
    }
}
