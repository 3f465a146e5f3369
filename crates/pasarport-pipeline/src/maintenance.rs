//! Target housekeeping around the table loads: clearing before, counter
//! resets and bookkeeping rows after.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use pasarport_core::{InsertMode, Result, TargetSchema, TargetStore, clear_order};

use crate::settings::default_settings_row;

pub const ALEMBIC_TABLE: &str = "alembic_version";
pub const SETTINGS_TABLE: &str = "settings";

/// Empty every migrated target table, children first, with foreign key
/// checks suspended for the duration. Returns the number of tables cleared.
///
/// Checks are switched back on whether or not clearing succeeded.
pub async fn clear_target<T>(store: &mut T, excluded: &BTreeSet<String>) -> Result<usize>
where
    T: TargetStore + ?Sized,
{
    info!("clearing target tables");
    store.set_foreign_key_checks(false).await?;
    let cleared = clear_tables(store, excluded).await;
    let restored = store.set_foreign_key_checks(true).await;
    let cleared = cleared?;
    restored?;
    info!(tables = cleared, "target cleared");
    Ok(cleared)
}

async fn clear_tables<T>(store: &mut T, excluded: &BTreeSet<String>) -> Result<usize>
where
    T: TargetStore + ?Sized,
{
    let mut cleared = 0;
    for spec in clear_order() {
        if excluded.contains(spec.name) {
            continue;
        }
        if !store.table_exists(spec.name).await? {
            debug!(table = %spec.name, "table absent, nothing to clear");
            continue;
        }
        match store.clear_table(spec.name).await {
            Ok(()) => cleared += 1,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => warn!(table = %spec.name, error = %err, "could not clear table"),
        }
    }
    Ok(cleared)
}

/// Move every auto-increment counter to one past the current maximum id.
///
/// Best effort: failures are logged and a dropped connection is re-opened
/// before moving on. Returns the number of counters reset.
pub async fn reset_auto_increments<T>(store: &mut T) -> usize
where
    T: TargetStore + ?Sized,
{
    let columns = match store.auto_increment_columns().await {
        Ok(columns) => columns,
        Err(err) => {
            warn!(error = %err, "could not list auto-increment columns");
            return 0;
        }
    };

    let mut reset = 0;
    for (table, column) in columns {
        let max = match store.max_id(&table, &column).await {
            Ok(Some(max)) if max > 0 => max,
            Ok(_) => continue,
            Err(err) => {
                warn!(table = %table, column = %column, error = %err, "could not read max id");
                if err.is_fatal() && !reopen(store).await {
                    return reset;
                }
                continue;
            }
        };
        match store.set_auto_increment(&table, max + 1).await {
            Ok(()) => {
                debug!(table = %table, next = max + 1, "auto-increment reset");
                reset += 1;
            }
            Err(err) => {
                warn!(table = %table, error = %err, "could not reset auto-increment");
                if err.is_fatal() && !reopen(store).await {
                    return reset;
                }
            }
        }
    }
    info!(counters = reset, "auto-increment counters reset");
    reset
}

async fn reopen<T>(store: &mut T) -> bool
where
    T: TargetStore + ?Sized,
{
    match store.reconnect().await {
        Ok(()) => {
            info!("target connection re-opened");
            true
        }
        Err(err) => {
            warn!(error = %err, "could not re-open target connection");
            false
        }
    }
}

/// Record `version` as the target's schema revision. Returns `false` when
/// the target has no revision table.
pub async fn stamp_alembic<T>(store: &mut T, version: &str) -> Result<bool>
where
    T: TargetStore + ?Sized,
{
    if !store.table_exists(ALEMBIC_TABLE).await? {
        info!("no alembic_version table, skipping revision stamp");
        return Ok(false);
    }
    store.set_alembic_version(version).await?;
    info!(version = %version, "alembic revision stamped");
    Ok(true)
}

/// Insert the default settings row when the settings table exists and is
/// empty. Returns whether a row was written.
pub async fn seed_default_settings<T>(store: &mut T, schema: &TargetSchema) -> Result<bool>
where
    T: TargetStore + ?Sized,
{
    if !store.table_exists(SETTINGS_TABLE).await? {
        debug!("no settings table, skipping defaults");
        return Ok(false);
    }
    if store.count_rows(SETTINGS_TABLE).await? > 0 {
        debug!("settings already present");
        return Ok(false);
    }
    let row = default_settings_row(schema.table(SETTINGS_TABLE));
    if row.is_empty() {
        return Ok(false);
    }
    let columns: Vec<String> = row.keys().cloned().collect();
    store
        .insert_rows(SETTINGS_TABLE, &columns, &[row], InsertMode::Strict)
        .await?;
    info!("default settings row created");
    Ok(true)
}
