use std::collections::BTreeSet;

use crate::references::EntityKind;
use crate::store::InsertMode;

/// Where a target table's rows come from in the source snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// Source table with the same name.
    Native,
    /// Same name first, then each listed legacy name in turn.
    Aliased(&'static [&'static str]),
    /// One synthesized row per row of another source table.
    Derived(&'static str),
    /// Produced by the extractor's dedicated query under the target name.
    Extracted,
}

/// One entry of the migration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub source: RowSource,
    pub insert_mode: InsertMode,
    /// Universe re-read from the target once this table is loaded.
    pub refreshes: Option<EntityKind>,
}

impl TableSpec {
    const fn native(name: &'static str, depends_on: &'static [&'static str]) -> Self {
        Self {
            name,
            depends_on,
            source: RowSource::Native,
            insert_mode: InsertMode::Strict,
            refreshes: None,
        }
    }

    const fn source(mut self, source: RowSource) -> Self {
        self.source = source;
        self
    }

    const fn ignore_duplicates(mut self) -> Self {
        self.insert_mode = InsertMode::IgnoreDuplicates;
        self
    }

    const fn refreshes(mut self, kind: EntityKind) -> Self {
        self.refreshes = Some(kind);
        self
    }

    /// Source tables to read, in preference order. The first non-empty one wins.
    pub fn source_candidates(&self) -> Vec<&'static str> {
        match self.source {
            RowSource::Native | RowSource::Extracted => vec![self.name],
            RowSource::Aliased(aliases) => {
                let mut names = vec![self.name];
                names.extend_from_slice(aliases);
                names
            }
            RowSource::Derived(table) => vec![table],
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.source, RowSource::Derived(_))
    }
}

/// Target tables in load order: every table after everything it references.
pub const MIGRATION_ORDER: &[TableSpec] = &[
    TableSpec::native("admins", &[]).refreshes(EntityKind::Admin),
    TableSpec::native("core_configs", &[]).source(RowSource::Derived("inbounds")),
    TableSpec::native("nodes", &[]),
    TableSpec::native("inbounds", &[])
        .ignore_duplicates()
        .refreshes(EntityKind::InboundId),
    TableSpec::native("groups", &[]).source(RowSource::Aliased(&["services"])),
    TableSpec::native("inbounds_groups_association", &["inbounds", "groups"])
        .source(RowSource::Aliased(&["inbounds_services", "service_inbounds"])),
    TableSpec::native("hosts", &["inbounds"]),
    TableSpec::native("user_templates", &[]),
    TableSpec::native("template_group_association", &["user_templates", "groups"]),
    TableSpec::native("users", &["admins"]),
    TableSpec::native("users_groups_association", &["users", "groups"])
        .source(RowSource::Aliased(&["users_services"])),
    TableSpec::native("next_plans", &["users", "user_templates"]),
    TableSpec::native("admin_usage_logs", &["admins"])
        .source(RowSource::Extracted)
        .ignore_duplicates(),
    TableSpec::native("user_usage_logs", &["users"]).ignore_duplicates(),
    TableSpec::native("notification_reminders", &["users"]),
    TableSpec::native("user_subscription_updates", &["users"]),
    TableSpec::native("node_user_usages", &["users", "nodes"]).ignore_duplicates(),
    TableSpec::native("node_usages", &["nodes"]).ignore_duplicates(),
    TableSpec::native("node_stats", &["nodes"]).ignore_duplicates(),
];

/// Tables never extracted, cleared, or migrated unless configured otherwise.
pub const DEFAULT_EXCLUDED_TABLES: &[&str] = &[
    "alembic_version",
    "django_migrations",
    "flyway_schema_history",
    "schema_migrations",
    "jwt",
    "system",
    "settings",
];

pub fn table_spec(name: &str) -> Option<&'static TableSpec> {
    MIGRATION_ORDER.iter().find(|spec| spec.name == name)
}

/// Reverse load order, used when clearing the target.
pub fn clear_order() -> impl Iterator<Item = &'static TableSpec> {
    MIGRATION_ORDER.iter().rev()
}

/// Check that every dependency appears strictly before its dependent.
pub fn check_order(order: &[TableSpec]) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for spec in order {
        if !seen.insert(spec.name) {
            return Err(format!("{} appears twice", spec.name));
        }
        for dependency in spec.depends_on {
            if !seen.contains(dependency) {
                return Err(format!(
                    "{} depends on {} which is not loaded before it",
                    spec.name, dependency
                ));
            }
        }
    }
    Ok(())
}
