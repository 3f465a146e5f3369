use std::collections::BTreeSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use pasarport_core::{
    DEFAULT_EXCLUDED_TABLES, MIGRATION_ORDER, MappingRules, MigrationStatistics, ReferenceValidator,
    Row, Snapshot, SourceExtractor, TableColumns, TableSpec, TableStats, TargetSchema,
    TargetStore, check_order,
};
use pasarport_transform::RowTransformer;

use crate::errors::PipelineError;
use crate::loader::{BatchLoader, DEFAULT_BATCH_SIZE};
use crate::maintenance::{clear_target, reset_auto_increments, seed_default_settings, stamp_alembic};

pub const DEFAULT_ALEMBIC_VERSION: &str = "5943013d0e49";
const ADMIN_USAGE_LOGS: &str = "admin_usage_logs";

/// Knobs for one migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOptions {
    pub batch_size: usize,
    /// Tables skipped by extraction, clearing and loading.
    pub excluded_tables: BTreeSet<String>,
    pub clear_target: bool,
    /// Revision written to `alembic_version`; `None` skips stamping.
    pub alembic_version: Option<String>,
    pub seed_settings: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            excluded_tables: DEFAULT_EXCLUDED_TABLES
                .iter()
                .map(|table| table.to_string())
                .collect(),
            clear_target: true,
            alembic_version: Some(DEFAULT_ALEMBIC_VERSION.to_string()),
            seed_settings: true,
        }
    }
}

/// Runs the whole source-to-target migration.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    options: MigrationOptions,
    rules: MappingRules,
}

impl MigrationEngine {
    pub fn new(options: MigrationOptions) -> Self {
        Self {
            options,
            rules: MappingRules::standard(),
        }
    }

    pub fn with_rules(mut self, rules: MappingRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    pub async fn run<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
    ) -> Result<MigrationStatistics, PipelineError>
    where
        S: SourceExtractor + ?Sized,
        T: TargetStore + ?Sized,
    {
        let start = Instant::now();
        check_order(MIGRATION_ORDER).map_err(PipelineError::InvalidOrder)?;
        let excluded = &self.options.excluded_tables;
        info!(
            tables = MIGRATION_ORDER.len(),
            excluded = excluded.len(),
            batch_size = self.options.batch_size,
            "migration started"
        );

        let snapshot = self.extract(source).await?;
        let mut validator = ReferenceValidator::from_snapshot(&snapshot);
        let schema = target
            .introspect()
            .await
            .map_err(PipelineError::Introspection)?;
        info!(tables = schema.table_names().count(), "target schema loaded");

        if self.options.clear_target {
            clear_target(target, excluded).await?;
        }

        let mut transformer = RowTransformer::new(self.rules.clone()).with_snapshot(&snapshot);
        let loader = BatchLoader::new(self.options.batch_size);
        let mut statistics = MigrationStatistics::new();

        for spec in MIGRATION_ORDER {
            if excluded.contains(spec.name) {
                info!(table = %spec.name, "[SKIP] {} (excluded)", spec.name);
                continue;
            }
            let Some(columns) = schema.table(spec.name) else {
                warn!(table = %spec.name, "table missing in target, skipping");
                continue;
            };
            let Some((source_table, rows)) = source_rows(spec, &snapshot) else {
                info!(table = %spec.name, "no source rows");
                continue;
            };

            let table_start = Instant::now();
            let mut stats = TableStats::new(source_table, rows.len());
            info!(
                table = %spec.name,
                source = %source_table,
                rows = rows.len(),
                "migrating table"
            );

            let step = TableStep {
                spec,
                columns,
                rows,
            };
            match step
                .run(target, &mut transformer, &validator, &loader, &mut stats)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    error!(table = %spec.name, error = %err, "table migration failed");
                    stats.error = Some(err.to_string());
                }
            }

            if let (Some(kind), false) = (spec.refreshes, stats.is_failed()) {
                match target.select_column(kind.target_table(), kind.key_column()).await {
                    Ok(values) => validator.refresh(kind, values),
                    Err(err) if err.is_fatal() => return Err(err.into()),
                    Err(err) => warn!(
                        table = %spec.name,
                        error = %err,
                        "could not refresh reference ids from target"
                    ),
                }
            }

            stats.duration = table_start.elapsed();
            statistics.record(spec.name, stats);
        }

        self.housekeeping(target, &schema).await;

        statistics.duration = start.elapsed();
        let totals = statistics.totals();
        info!(
            migrated = totals.tables_migrated,
            failed = totals.tables_failed,
            rows_loaded = totals.rows_loaded,
            rows_failed = totals.rows_failed,
            "migration finished"
        );
        Ok(statistics)
    }

    async fn extract<S>(&self, source: &mut S) -> Result<Snapshot, PipelineError>
    where
        S: SourceExtractor + ?Sized,
    {
        let excluded = &self.options.excluded_tables;
        let mut snapshot = source
            .extract_all_tables(excluded)
            .await
            .map_err(PipelineError::Extraction)?;

        if !excluded.contains(ADMIN_USAGE_LOGS) {
            match source.extract_admin_usage_logs().await {
                Ok(rows) => {
                    info!(rows = rows.len(), "admin usage logs derived");
                    snapshot.insert(ADMIN_USAGE_LOGS.to_string(), rows);
                }
                Err(err) if err.is_fatal() => return Err(PipelineError::Extraction(err)),
                Err(err) => warn!(error = %err, "could not derive admin usage logs"),
            }
        }

        let rows: usize = snapshot.values().map(Vec::len).sum();
        info!(tables = snapshot.len(), rows, "source extracted");
        Ok(snapshot)
    }

    /// Post-load steps. Failures are logged and never end the run.
    async fn housekeeping<T>(&self, target: &mut T, schema: &TargetSchema)
    where
        T: TargetStore + ?Sized,
    {
        reset_auto_increments(target).await;

        if let Some(version) = &self.options.alembic_version {
            if let Err(err) = stamp_alembic(target, version).await {
                warn!(error = %err, "could not stamp alembic revision");
            }
        }

        if self.options.seed_settings {
            if let Err(err) = seed_default_settings(target, schema).await {
                warn!(error = %err, "could not seed default settings");
            }
        }
    }
}

/// First non-empty source table feeding `spec`.
fn source_rows<'a>(spec: &TableSpec, snapshot: &'a Snapshot) -> Option<(&'static str, &'a [Row])> {
    spec.source_candidates().into_iter().find_map(|name| {
        snapshot
            .get(name)
            .filter(|rows| !rows.is_empty())
            .map(|rows| (name, rows.as_slice()))
    })
}

/// One table's validate, convert and load sequence.
struct TableStep<'a> {
    spec: &'a TableSpec,
    columns: &'a TableColumns,
    rows: &'a [Row],
}

impl TableStep<'_> {
    async fn run<T>(
        &self,
        target: &mut T,
        transformer: &mut RowTransformer,
        validator: &ReferenceValidator,
        loader: &BatchLoader,
        stats: &mut TableStats,
    ) -> pasarport_core::Result<()>
    where
        T: TargetStore + ?Sized,
    {
        let table = self.spec.name;

        let filtered = validator.filter(table, self.rows.to_vec());
        stats.filtered_foreign_keys = filtered.dropped;

        let converted = transformer.convert_table(table, &filtered.kept, self.columns);
        stats.failed_conversion = converted.failed;
        stats.converted = converted.rows.len();

        let checked = transformer.validate_required(table, converted.rows, self.columns);
        stats.filtered_required = checked.dropped;
        stats.attempted = checked.kept.len();

        let loaded = loader
            .load(target, table, &checked.kept, self.spec.insert_mode)
            .await?;
        stats.loaded = loaded.succeeded;
        stats.failed = loaded.failed;
        stats.ignored_duplicates = loaded.ignored;

        info!(
            table = %table,
            source_rows = stats.source_rows,
            filtered_fk = stats.filtered_foreign_keys,
            failed_conversion = stats.failed_conversion,
            filtered_required = stats.filtered_required,
            loaded = stats.loaded,
            failed = stats.failed,
            ignored = stats.ignored_duplicates,
            "table migrated"
        );
        Ok(())
    }
}
