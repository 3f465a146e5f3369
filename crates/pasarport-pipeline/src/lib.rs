//! Migration orchestration: batch loading, target housekeeping and the
//! table-by-table run over the source and target collaborators.

pub mod engine;
pub mod errors;
pub mod loader;
pub mod maintenance;
pub mod report;
pub mod settings;

pub use engine::{DEFAULT_ALEMBIC_VERSION, MigrationEngine, MigrationOptions};
pub use errors::PipelineError;
pub use loader::{BatchLoader, DEFAULT_BATCH_SIZE, LoadOutcome};
pub use report::{format_duration, render_summary};
