use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::value::{Row, Snapshot, Value};

/// Entity kinds other tables may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Admin,
    User,
    Node,
    Group,
    InboundId,
    InboundTag,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Admin,
        EntityKind::User,
        EntityKind::Node,
        EntityKind::Group,
        EntityKind::InboundId,
        EntityKind::InboundTag,
    ];

    /// Source tables holding this entity, in preference order.
    pub fn source_tables(self) -> &'static [&'static str] {
        match self {
            EntityKind::Admin => &["admins"],
            EntityKind::User => &["users"],
            EntityKind::Node => &["nodes"],
            EntityKind::Group => &["services", "groups"],
            EntityKind::InboundId | EntityKind::InboundTag => &["inbounds"],
        }
    }

    /// Target table re-read on refresh.
    pub fn target_table(self) -> &'static str {
        match self {
            EntityKind::Admin => "admins",
            EntityKind::User => "users",
            EntityKind::Node => "nodes",
            EntityKind::Group => "groups",
            EntityKind::InboundId | EntityKind::InboundTag => "inbounds",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            EntityKind::InboundTag => "tag",
            _ => "id",
        }
    }

    /// Normalize a cell into the key space of this entity kind.
    pub fn key_of(self, value: &Value) -> Option<RefKey> {
        match self {
            EntityKind::InboundTag => value.render().map(RefKey::Tag),
            _ => value.as_i64().map(RefKey::Id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefKey {
    Id(i64),
    Tag(String),
}

/// Valid identifiers per entity kind.
#[derive(Debug, Clone, Default)]
pub struct ReferenceUniverse {
    keys: BTreeMap<EntityKind, BTreeSet<RefKey>>,
}

impl ReferenceUniverse {
    /// Collect every identifier present in the source snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut universe = Self::default();
        for kind in EntityKind::ALL {
            let rows = kind
                .source_tables()
                .iter()
                .filter_map(|table| snapshot.get(*table))
                .find(|rows| !rows.is_empty());
            let keys: BTreeSet<RefKey> = rows
                .into_iter()
                .flatten()
                .filter_map(|row| row.get(kind.key_column()))
                .filter_map(|value| kind.key_of(value))
                .collect();
            info!(kind = ?kind, count = keys.len(), "reference universe built");
            universe.keys.insert(kind, keys);
        }
        universe
    }

    pub fn contains(&self, kind: EntityKind, value: &Value) -> bool {
        match kind.key_of(value) {
            Some(key) => self.keys.get(&kind).is_some_and(|set| set.contains(&key)),
            None => false,
        }
    }

    /// Swap one kind's keys for freshly read ones.
    pub fn replace(&mut self, kind: EntityKind, values: impl IntoIterator<Item = Value>) {
        let keys: BTreeSet<RefKey> = values
            .into_iter()
            .filter_map(|value| kind.key_of(&value))
            .collect();
        debug!(kind = ?kind, count = keys.len(), "reference universe replaced");
        self.keys.insert(kind, keys);
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.keys.get(&kind).map_or(0, BTreeSet::len)
    }
}

/// A declared foreign key on a source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FkRule {
    /// Alternative column names; any present value may satisfy the rule.
    pub columns: &'static [&'static str],
    pub kind: EntityKind,
    pub nullable: bool,
}

const fn fk(columns: &'static [&'static str], kind: EntityKind) -> FkRule {
    FkRule {
        columns,
        kind,
        nullable: false,
    }
}

const fn nullable_fk(columns: &'static [&'static str], kind: EntityKind) -> FkRule {
    FkRule {
        columns,
        kind,
        nullable: true,
    }
}

const USERS_FKS: &[FkRule] = &[nullable_fk(&["admin_id"], EntityKind::Admin)];
const USER_GROUP_FKS: &[FkRule] = &[
    fk(&["user_id"], EntityKind::User),
    fk(&["groups_id", "service_id"], EntityKind::Group),
];
const INBOUND_GROUP_FKS: &[FkRule] = &[
    fk(&["inbound_id"], EntityKind::InboundId),
    fk(&["group_id", "service_id"], EntityKind::Group),
];
const NODE_USER_USAGE_FKS: &[FkRule] = &[
    fk(&["user_id"], EntityKind::User),
    nullable_fk(&["node_id"], EntityKind::Node),
];
const NODE_FKS: &[FkRule] = &[nullable_fk(&["node_id"], EntityKind::Node)];
const HOST_FKS: &[FkRule] = &[
    nullable_fk(&["inbound_id"], EntityKind::InboundId),
    nullable_fk(&["inbound_tag"], EntityKind::InboundTag),
];
const USER_FKS: &[FkRule] = &[fk(&["user_id"], EntityKind::User)];
const ADMIN_FKS: &[FkRule] = &[fk(&["admin_id"], EntityKind::Admin)];

/// Foreign keys checked for each target table.
pub fn fk_rules(table: &str) -> &'static [FkRule] {
    match table {
        "users" => USERS_FKS,
        "users_groups_association" => USER_GROUP_FKS,
        "inbounds_groups_association" => INBOUND_GROUP_FKS,
        "node_user_usages" => NODE_USER_USAGE_FKS,
        "node_usages" | "node_stats" => NODE_FKS,
        "hosts" => HOST_FKS,
        "user_usage_logs" | "notification_reminders" | "user_subscription_updates" => USER_FKS,
        "admin_usage_logs" => ADMIN_FKS,
        _ => &[],
    }
}

/// Rows kept by a filter pass and how many were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub kept: Vec<Row>,
    pub dropped: usize,
}

/// Drops rows whose foreign keys point outside the reference universe.
#[derive(Debug, Clone, Default)]
pub struct ReferenceValidator {
    universe: ReferenceUniverse,
}

impl ReferenceValidator {
    pub fn new(universe: ReferenceUniverse) -> Self {
        Self { universe }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::new(ReferenceUniverse::from_snapshot(snapshot))
    }

    pub fn universe(&self) -> &ReferenceUniverse {
        &self.universe
    }

    pub fn refresh(&mut self, kind: EntityKind, values: impl IntoIterator<Item = Value>) {
        self.universe.replace(kind, values);
    }

    pub fn is_valid(&self, table: &str, row: &Row) -> bool {
        fk_rules(table).iter().all(|rule| self.satisfies(rule, row))
    }

    fn satisfies(&self, rule: &FkRule, row: &Row) -> bool {
        let mut present = rule
            .columns
            .iter()
            .filter_map(|column| row.get(*column))
            .filter(|value| !value.is_null())
            .peekable();

        if present.peek().is_none() {
            return rule.nullable;
        }
        present.any(|value| self.universe.contains(rule.kind, value))
    }

    pub fn filter(&self, table: &str, rows: Vec<Row>) -> FilterOutcome {
        let total = rows.len();
        let kept: Vec<Row> = rows
            .into_iter()
            .filter(|row| self.is_valid(table, row))
            .collect();
        let dropped = total - kept.len();
        if dropped > 0 {
            info!(table = %table, dropped, "filtered rows with invalid foreign keys");
        }
        FilterOutcome { kept, dropped }
    }
}
