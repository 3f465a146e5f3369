use std::fmt::Write as _;
use std::time::Duration;

use pasarport_core::MigrationStatistics;

/// `1h 23m 45s`, `2m 5s`, or `12s 340ms` below a minute.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s {}ms", duration.subsec_millis())
    }
}

/// Human-readable per-table summary printed at the end of a run.
pub fn render_summary(statistics: &MigrationStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration summary");
    let _ = writeln!(out, "{}", "-".repeat(72));

    for (table, stats) in statistics.iter() {
        if let Some(error) = &stats.error {
            let _ = writeln!(out, "FAIL {table:<30} {error}");
            continue;
        }
        let status = if stats.failed > 0 { "WARN" } else { "OK  " };
        let _ = write!(
            out,
            "{status} {table:<30} {loaded}/{attempted} loaded",
            loaded = stats.loaded,
            attempted = stats.attempted,
        );
        if stats.failed > 0 {
            let _ = write!(out, ", {} failed", stats.failed);
        }
        if stats.ignored_duplicates > 0 {
            let _ = write!(out, ", {} duplicates ignored", stats.ignored_duplicates);
        }
        if stats.filtered_foreign_keys > 0 {
            let _ = write!(out, ", {} orphaned", stats.filtered_foreign_keys);
        }
        if stats.failed_conversion > 0 {
            let _ = write!(out, ", {} not converted", stats.failed_conversion);
        }
        if stats.filtered_required > 0 {
            let _ = write!(out, ", {} missing required fields", stats.filtered_required);
        }
        let _ = writeln!(out, " ({})", format_duration(stats.duration));
    }

    let totals = statistics.totals();
    let _ = writeln!(out, "{}", "-".repeat(72));
    let _ = writeln!(
        out,
        "{} tables migrated, {} failed; {} rows loaded, {} rows failed; total {}",
        totals.tables_migrated,
        totals.tables_failed,
        totals.rows_loaded,
        totals.rows_failed,
        format_duration(statistics.duration)
    );
    out
}
