//! Shared data model and rule tables for migrating a Marzneshin database
//! into PasarGuard.
//!
//! Nothing here performs I/O. Database access goes through the
//! [`SourceExtractor`] and [`TargetStore`] traits.

pub mod coerce;
pub mod error;
pub mod ledger;
pub mod mapping;
pub mod order;
pub mod references;
pub mod schema;
pub mod stats;
pub mod store;
pub mod value;

pub use coerce::{coerce, coerce_for_column, coerce_row, default_value, parse_timestamp, zero_value};
pub use error::{Error, Result};
pub use ledger::{Namespace, UniquenessLedger};
pub use mapping::{ColumnAction, ColumnRule, MappingRules, PassThrough, Resolution, Transform};
pub use order::{
    DEFAULT_EXCLUDED_TABLES, MIGRATION_ORDER, RowSource, TableSpec, check_order, clear_order,
    table_spec,
};
pub use references::{
    EntityKind, FilterOutcome, FkRule, RefKey, ReferenceUniverse, ReferenceValidator, fk_rules,
};
pub use schema::{ColumnKind, TableColumns, TargetColumnInfo, TargetSchema, parse_enum_domain};
pub use stats::{MigrationStatistics, TableStats, Totals};
pub use store::{InsertMode, SourceExtractor, TargetStore};
pub use value::{Row, Snapshot, Value, row_id};
