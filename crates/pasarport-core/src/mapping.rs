//! Declarative per-table column rules.
//!
//! Rules are keyed by target table name. Columns a rule set does not mention,
//! and every column of a table without a rule set, map to themselves.

use std::collections::BTreeMap;

use serde::Serialize;

/// Closed set of value transforms a column rule may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Boolean `enabled` flag to an `active` / `disabled` status.
    EnabledToStatus,
    InvertBoolean,
    /// Any node status becomes `connecting`.
    NodeStatus,
    /// Backend name normalized to `grpc` or `rest`.
    ConnectionBackend,
    /// ALPN list validated, with `none` rewritten to `h2`.
    Alpn,
    Fingerprint,
    /// Inbound id replaced by the tag resolved for that inbound.
    InboundIdToTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAction {
    Skip,
    Rename(&'static str),
    Apply {
        target: &'static str,
        transform: Transform,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRule {
    pub source: &'static str,
    pub action: ColumnAction,
}

const fn skip(source: &'static str) -> ColumnRule {
    ColumnRule {
        source,
        action: ColumnAction::Skip,
    }
}

const fn rename(source: &'static str, target: &'static str) -> ColumnRule {
    ColumnRule {
        source,
        action: ColumnAction::Rename(target),
    }
}

const fn keep(source: &'static str) -> ColumnRule {
    rename(source, source)
}

const fn apply(source: &'static str, target: &'static str, transform: Transform) -> ColumnRule {
    ColumnRule {
        source,
        action: ColumnAction::Apply { target, transform },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThrough {
    /// The table has no rule set at all.
    NoRuleSet,
    /// The table has rules but none for this column.
    UndeclaredColumn,
}

/// Outcome of looking up one source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Drop,
    Map {
        target: &'a str,
        transform: Option<Transform>,
    },
    Identity(PassThrough),
}

const USERS: &[ColumnRule] = &[
    keep("id"),
    keep("username"),
    keep("created_at"),
    keep("data_limit"),
    keep("used_traffic"),
    keep("admin_id"),
    keep("data_limit_reset_strategy"),
    apply("enabled", "status", Transform::EnabledToStatus),
    rename("expire_date", "expire"),
    rename("sub_updated_at", "edit_at"),
    // Consumed by proxy settings derivation.
    skip("key"),
    skip("sub_last_user_agent"),
    skip("ip_limit"),
    skip("usage_duration"),
    skip("activation_deadline"),
    skip("lifetime_used_traffic"),
    skip("traffic_reset_at"),
    skip("activated"),
    skip("expire_strategy"),
    skip("removed"),
    skip("settings"),
];

const ADMINS: &[ColumnRule] = &[
    keep("id"),
    keep("username"),
    keep("hashed_password"),
    keep("created_at"),
    keep("is_sudo"),
    keep("password_reset_at"),
    apply("enabled", "is_disabled", Transform::InvertBoolean),
    rename("subscription_url_prefix", "sub_domain"),
    skip("all_services_access"),
    skip("modify_users_access"),
];

const NODES: &[ColumnRule] = &[
    keep("id"),
    keep("name"),
    keep("address"),
    keep("port"),
    keep("xray_version"),
    apply("status", "status", Transform::NodeStatus),
    keep("last_status_change"),
    keep("message"),
    keep("created_at"),
    keep("uplink"),
    keep("downlink"),
    keep("usage_coefficient"),
    apply("connection_backend", "connection_type", Transform::ConnectionBackend),
];

const INBOUNDS: &[ColumnRule] = &[
    keep("id"),
    keep("tag"),
    skip("protocol"),
    skip("config"),
    skip("settings"),
    skip("sniffing"),
    skip("stream_settings"),
    skip("port"),
    skip("node_id"),
    skip("created_at"),
    skip("updated_at"),
];

const HOSTS: &[ColumnRule] = &[
    keep("id"),
    rename("name", "remark"),
    keep("address"),
    keep("port"),
    keep("path"),
    keep("sni"),
    keep("host"),
    keep("security"),
    apply("alpn", "alpn", Transform::Alpn),
    apply("fingerprint", "fingerprint", Transform::Fingerprint),
    keep("allowinsecure"),
    keep("is_disabled"),
    apply("inbound_id", "inbound_tag", Transform::InboundIdToTag),
    keep("priority"),
    skip("status"),
];

const GROUPS: &[ColumnRule] = &[
    keep("id"),
    keep("name"),
    // Read as a name fallback by the computed-field step.
    skip("description"),
];

const USERS_GROUPS: &[ColumnRule] = &[
    keep("user_id"),
    rename("service_id", "groups_id"),
    skip("created_at"),
    skip("id"),
];

const INBOUNDS_GROUPS: &[ColumnRule] = &[keep("inbound_id"), rename("service_id", "group_id")];

const USER_TEMPLATES: &[ColumnRule] = &[
    keep("id"),
    keep("name"),
    keep("data_limit"),
    keep("expire_duration"),
    keep("data_limit_reset_strategy"),
    keep("username_prefix"),
    keep("username_suffix"),
];

const NEXT_PLANS: &[ColumnRule] = &[
    keep("id"),
    keep("user_id"),
    keep("user_template_id"),
    keep("data_limit"),
    rename("expire_duration", "expire"),
    skip("created_at"),
];

const NODE_USER_USAGES: &[ColumnRule] = &[
    keep("id"),
    keep("created_at"),
    keep("user_id"),
    keep("node_id"),
    keep("used_traffic"),
];

const NODE_USAGES: &[ColumnRule] = &[
    keep("id"),
    keep("created_at"),
    keep("node_id"),
    keep("uplink"),
    keep("downlink"),
    // Used as an uplink fallback by the computed-field step.
    skip("used_traffic"),
];

const ADMIN_USAGE_LOGS: &[ColumnRule] = &[
    keep("id"),
    keep("created_at"),
    keep("admin_id"),
    keep("used_traffic"),
    keep("used_traffic_at_reset"),
];

/// Column rules for every target table that has them.
#[derive(Debug, Clone, Default)]
pub struct MappingRules {
    tables: BTreeMap<&'static str, &'static [ColumnRule]>,
}

impl MappingRules {
    /// Rules for migrating a Marzneshin database into PasarGuard.
    pub fn standard() -> Self {
        let mut rules = Self::default();
        rules.insert("users", USERS);
        rules.insert("admins", ADMINS);
        rules.insert("nodes", NODES);
        rules.insert("inbounds", INBOUNDS);
        rules.insert("hosts", HOSTS);
        rules.insert("groups", GROUPS);
        rules.insert("users_groups_association", USERS_GROUPS);
        rules.insert("inbounds_groups_association", INBOUNDS_GROUPS);
        rules.insert("user_templates", USER_TEMPLATES);
        rules.insert("next_plans", NEXT_PLANS);
        rules.insert("node_user_usages", NODE_USER_USAGES);
        rules.insert("node_usages", NODE_USAGES);
        rules.insert("admin_usage_logs", ADMIN_USAGE_LOGS);
        rules
    }

    pub fn insert(&mut self, table: &'static str, rules: &'static [ColumnRule]) {
        self.tables.insert(table, rules);
    }

    pub fn has_rules(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn rules(&self, table: &str) -> Option<&'static [ColumnRule]> {
        self.tables.get(table).copied()
    }

    pub fn resolve<'a>(&self, table: &str, column: &'a str) -> Resolution<'a> {
        let Some(rules) = self.tables.get(table) else {
            return Resolution::Identity(PassThrough::NoRuleSet);
        };
        let Some(rule) = rules.iter().find(|rule| rule.source == column) else {
            return Resolution::Identity(PassThrough::UndeclaredColumn);
        };
        match rule.action {
            ColumnAction::Skip => Resolution::Drop,
            ColumnAction::Rename(target) => Resolution::Map {
                target,
                transform: None,
            },
            ColumnAction::Apply { target, transform } => Resolution::Map {
                target,
                transform: Some(transform),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_without_rules_maps_identity() {
        let rules = MappingRules::standard();
        assert_eq!(
            rules.resolve("notification_reminders", "user_id"),
            Resolution::Identity(PassThrough::NoRuleSet)
        );
    }

    #[test]
    fn undeclared_column_maps_identity() {
        let rules = MappingRules::standard();
        assert_eq!(
            rules.resolve("users", "note"),
            Resolution::Identity(PassThrough::UndeclaredColumn)
        );
    }

    #[test]
    fn declared_rules_drop_rename_and_transform() {
        let rules = MappingRules::standard();
        assert_eq!(rules.resolve("users", "key"), Resolution::Drop);
        assert_eq!(
            rules.resolve("users", "expire_date"),
            Resolution::Map {
                target: "expire",
                transform: None
            }
        );
        assert_eq!(
            rules.resolve("hosts", "inbound_id"),
            Resolution::Map {
                target: "inbound_tag",
                transform: Some(Transform::InboundIdToTag)
            }
        );
    }

    #[test]
    fn rule_sets_have_unique_source_columns() {
        let rules = MappingRules::standard();
        for (table, columns) in &rules.tables {
            let mut seen = std::collections::BTreeSet::new();
            for rule in columns.iter() {
                assert!(seen.insert(rule.source), "{table}.{} declared twice", rule.source);
            }
        }
    }
}
