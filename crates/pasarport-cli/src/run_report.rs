use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pasarport_core::{MigrationStatistics, Totals};

use crate::config::MigrationSettings;

/// Machine-readable record of one run, written by `--report`.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Redacted `user@host:port/db`.
    pub source: String,
    pub target: String,
    pub options: &'a MigrationSettings,
    pub totals: Totals,
    pub statistics: &'a MigrationStatistics,
}

pub fn write_report(path: &Path, report: &RunReport<'_>) -> std::io::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report).map_err(std::io::Error::from)
}
