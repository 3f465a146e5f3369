use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::Row;

use pasarport_core::{Error, Result};

use crate::connect::store_error;

fn introspection_error(err: sqlx::Error) -> Error {
    Error::Introspection(err.to_string())
}

pub struct RawColumn {
    pub table_name: String,
    pub name: String,
    pub data_type: String,
    pub column_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub character_max_length: Option<i64>,
    pub is_auto_increment: bool,
}

/// Every column of every base table in the current database.
pub async fn list_columns(conn: &mut MySqlConnection) -> Result<Vec<RawColumn>> {
    let rows: Vec<MySqlRow> = sqlx::query(
        r#"
        SELECT
          CAST(c.TABLE_NAME AS CHAR(255)) AS table_name,
          CAST(c.COLUMN_NAME AS CHAR(255)) AS column_name,
          CAST(c.DATA_TYPE AS CHAR(255)) AS data_type,
          CAST(c.COLUMN_TYPE AS CHAR(4096)) AS column_type,
          CAST(IF(c.IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
          CAST(c.COLUMN_DEFAULT AS CHAR(4096)) AS column_default,
          CAST(c.CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS character_max_length,
          CAST(IF(c.EXTRA LIKE '%auto_increment%', 1, 0) AS SIGNED) AS is_auto_increment
        FROM INFORMATION_SCHEMA.COLUMNS c
        JOIN INFORMATION_SCHEMA.TABLES t
          ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
        WHERE c.TABLE_SCHEMA = DATABASE()
          AND t.TABLE_TYPE = 'BASE TABLE'
        ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(introspection_error)?;

    rows.iter()
        .map(|row| -> std::result::Result<RawColumn, sqlx::Error> {
            Ok(RawColumn {
                table_name: row.try_get("table_name")?,
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                column_type: row.try_get("column_type")?,
                is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                default: row.try_get("column_default")?,
                character_max_length: row.try_get("character_max_length")?,
                is_auto_increment: row.try_get::<i64, _>("is_auto_increment")? == 1,
            })
        })
        .collect::<std::result::Result<_, sqlx::Error>>()
        .map_err(introspection_error)
}

/// Base tables of the current database.
pub async fn list_tables(conn: &mut MySqlConnection) -> Result<Vec<String>> {
    let rows: Vec<MySqlRow> = sqlx::query(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR(255)) AS table_name
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(introspection_error)?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("table_name"))
        .collect::<std::result::Result<_, sqlx::Error>>()
        .map_err(introspection_error)
}

/// Column names of one table in ordinal order.
pub async fn table_column_names(conn: &mut MySqlConnection, table: &str) -> Result<Vec<String>> {
    let rows: Vec<MySqlRow> = sqlx::query(
        r#"
        SELECT CAST(COLUMN_NAME AS CHAR(255)) AS column_name
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_error)?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("column_name"))
        .collect::<std::result::Result<_, sqlx::Error>>()
        .map_err(store_error)
}

pub async fn table_exists(conn: &mut MySqlConnection, table: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        "#,
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await
    .map_err(store_error)?;
    Ok(count > 0)
}

/// `(table, column)` pairs whose column carries `auto_increment`.
pub async fn list_auto_increment_columns(
    conn: &mut MySqlConnection,
) -> Result<Vec<(String, String)>> {
    let rows: Vec<MySqlRow> = sqlx::query(
        r#"
        SELECT
          CAST(TABLE_NAME AS CHAR(255)) AS table_name,
          CAST(COLUMN_NAME AS CHAR(255)) AS column_name
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND EXTRA LIKE '%auto_increment%'
        ORDER BY TABLE_NAME
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(introspection_error)?;

    rows.iter()
        .map(|row| -> std::result::Result<(String, String), sqlx::Error> {
            Ok((row.try_get("table_name")?, row.try_get("column_name")?))
        })
        .collect::<std::result::Result<_, sqlx::Error>>()
        .map_err(introspection_error)
}
