//! Target schema introspection over `INFORMATION_SCHEMA`.

use sqlx::mysql::MySqlConnection;

use pasarport_core::{Result, TargetSchema};

mod mapper;
pub(crate) mod queries;

/// Column metadata for every base table of the connected database.
pub async fn introspect(conn: &mut MySqlConnection) -> Result<TargetSchema> {
    let raw = queries::list_columns(conn).await?;
    Ok(mapper::map_schema(raw))
}
