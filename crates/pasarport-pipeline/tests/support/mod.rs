//! In-memory collaborators for driving the pipeline without a database.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use pasarport_core::{
    Error, InsertMode, Result, Row, Snapshot, SourceExtractor, TargetColumnInfo, TargetSchema,
    TargetStore, Value,
};

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[derive(Debug, Default)]
pub struct FakeSource {
    pub snapshot: Snapshot,
    pub admin_usage_logs: Vec<Row>,
    pub extracted_with: Option<BTreeSet<String>>,
}

impl FakeSource {
    pub fn with_table(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.snapshot.insert(table.to_string(), rows);
        self
    }
}

#[async_trait]
impl SourceExtractor for FakeSource {
    async fn extract_all_tables(&mut self, excluded: &BTreeSet<String>) -> Result<Snapshot> {
        self.extracted_with = Some(excluded.clone());
        Ok(self
            .snapshot
            .iter()
            .filter(|(table, _)| !excluded.contains(*table))
            .map(|(table, rows)| (table.clone(), rows.clone()))
            .collect())
    }

    async fn extract_admin_usage_logs(&mut self) -> Result<Vec<Row>> {
        Ok(self.admin_usage_logs.clone())
    }
}

/// Target double enforcing unique columns and transactional inserts.
#[derive(Debug, Default)]
pub struct FakeTarget {
    pub schema: TargetSchema,
    pub tables: BTreeMap<String, Vec<Row>>,
    pub unique: BTreeMap<String, Vec<String>>,
    /// Rows holding this `(table, column, value)` are rejected with a statement error.
    pub rejects: Vec<(String, String, Value)>,
    /// Inserts into this table fail as if the connection dropped.
    pub disconnect_on: Option<String>,
    pub foreign_key_checks: Vec<bool>,
    pub cleared: Vec<String>,
    pub insert_calls: usize,
    pub auto_increments: BTreeMap<String, i64>,
    pub alembic_version: Option<String>,
    pub reconnects: usize,
}

impl FakeTarget {
    pub fn new(schema: TargetSchema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    pub fn unique(mut self, table: &str, column: &str) -> Self {
        self.unique
            .entry(table.to_string())
            .or_default()
            .push(column.to_string());
        self
    }

    pub fn reject(mut self, table: &str, column: &str, value: Value) -> Self {
        self.rejects
            .push((table.to_string(), column.to_string(), value));
        self
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn violation(&self, table: &str, row: &Row, pending: &[Row]) -> Option<String> {
        for (rejected_table, column, value) in &self.rejects {
            if rejected_table == table && row.get(column) == Some(value) {
                return Some(format!("bad value for {column}"));
            }
        }
        let existing = self.rows(table).iter().chain(pending);
        let unique = self.unique.get(table).cloned().unwrap_or_default();
        for other in existing {
            for column in &unique {
                let value = row.get(column);
                if value.is_some_and(|value| !value.is_null()) && other.get(column) == value {
                    return Some(format!("Duplicate entry for {table}.{column}"));
                }
            }
        }
        None
    }
}

#[async_trait]
impl TargetStore for FakeTarget {
    async fn introspect(&mut self) -> Result<TargetSchema> {
        Ok(self.schema.clone())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.schema.has_table(table))
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<()> {
        self.foreign_key_checks.push(enabled);
        Ok(())
    }

    async fn clear_table(&mut self, table: &str) -> Result<()> {
        self.tables.remove(table);
        self.cleared.push(table.to_string());
        Ok(())
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<u64> {
        self.insert_calls += 1;
        if self.disconnect_on.as_deref() == Some(table) {
            return Err(Error::Connection("server has gone away".into()));
        }
        let mut pending: Vec<Row> = Vec::new();
        for row in rows {
            let projected: Row = columns
                .iter()
                .filter_map(|column| row.get(column).map(|value| (column.clone(), value.clone())))
                .collect();
            match self.violation(table, &projected, &pending) {
                None => pending.push(projected),
                Some(_) if mode == InsertMode::IgnoreDuplicates => {}
                Some(reason) => return Err(Error::Statement(reason)),
            }
        }
        let written = pending.len() as u64;
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(pending);
        Ok(written)
    }

    async fn select_column(&mut self, table: &str, column: &str) -> Result<Vec<Value>> {
        Ok(self
            .rows(table)
            .iter()
            .filter_map(|row| row.get(column).cloned())
            .collect())
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        Ok(self.rows(table).len() as u64)
    }

    async fn auto_increment_columns(&mut self) -> Result<Vec<(String, String)>> {
        let mut columns = Vec::new();
        for table in self.schema.table_names() {
            if let Some(info) = self.schema.table(table) {
                columns.extend(
                    info.values()
                        .filter(|column| column.auto_increment)
                        .map(|column| (table.to_string(), column.name.clone())),
                );
            }
        }
        Ok(columns)
    }

    async fn max_id(&mut self, table: &str, column: &str) -> Result<Option<i64>> {
        Ok(self
            .rows(table)
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_i64))
            .max())
    }

    async fn set_auto_increment(&mut self, table: &str, next: i64) -> Result<()> {
        self.auto_increments.insert(table.to_string(), next);
        Ok(())
    }

    async fn set_alembic_version(&mut self, version: &str) -> Result<()> {
        self.alembic_version = Some(version.to_string());
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        Ok(())
    }
}

pub fn id_column() -> TargetColumnInfo {
    TargetColumnInfo::new("id", "int", "int").not_null().auto_increment()
}

/// A reduced PasarGuard schema covering the tables the tests touch.
pub fn pasarguard_schema() -> TargetSchema {
    TargetSchema::new()
        .with_table(
            "admins",
            vec![
                id_column(),
                TargetColumnInfo::new("username", "varchar", "varchar(34)").not_null(),
                TargetColumnInfo::new("hashed_password", "varchar", "varchar(128)").not_null(),
                TargetColumnInfo::new("is_sudo", "tinyint", "tinyint(1)"),
                TargetColumnInfo::new("is_disabled", "tinyint", "tinyint(1)")
                    .not_null()
                    .with_default("0"),
                TargetColumnInfo::new("used_traffic", "bigint", "bigint").not_null(),
            ],
        )
        .with_table(
            "nodes",
            vec![
                id_column(),
                TargetColumnInfo::new("name", "varchar", "varchar(256)").not_null(),
                TargetColumnInfo::new("address", "varchar", "varchar(256)").not_null(),
                TargetColumnInfo::new("port", "int", "int").not_null(),
                TargetColumnInfo::new("api_port", "int", "int").not_null(),
                TargetColumnInfo::new(
                    "status",
                    "enum",
                    "enum('connected','connecting','error','disabled')",
                )
                .not_null(),
                TargetColumnInfo::new("server_ca", "text", "text").not_null(),
                TargetColumnInfo::new("connection_type", "enum", "enum('grpc','rest')").not_null(),
            ],
        )
        .with_table(
            "core_configs",
            vec![
                id_column(),
                TargetColumnInfo::new("name", "varchar", "varchar(256)").not_null(),
                TargetColumnInfo::new("config", "json", "json").not_null(),
                TargetColumnInfo::new("created_at", "datetime", "datetime"),
            ],
        )
        .with_table(
            "inbounds",
            vec![
                id_column(),
                TargetColumnInfo::new("tag", "varchar", "varchar(256)").not_null(),
            ],
        )
        .with_table(
            "hosts",
            vec![
                id_column(),
                TargetColumnInfo::new("remark", "varchar", "varchar(256)").not_null(),
                TargetColumnInfo::new("address", "varchar", "varchar(256)").not_null(),
                TargetColumnInfo::new("port", "int", "int"),
                TargetColumnInfo::new("inbound_tag", "varchar", "varchar(256)"),
                TargetColumnInfo::new("priority", "int", "int").not_null(),
                TargetColumnInfo::new("path", "varchar", "varchar(256)"),
            ],
        )
        .with_table(
            "users",
            vec![
                id_column(),
                TargetColumnInfo::new("username", "varchar", "varchar(34)").not_null(),
                TargetColumnInfo::new(
                    "status",
                    "enum",
                    "enum('active','disabled','limited','expired','on_hold')",
                )
                .not_null(),
                TargetColumnInfo::new("proxy_settings", "json", "json").not_null(),
                TargetColumnInfo::new("admin_id", "int", "int"),
                TargetColumnInfo::new(
                    "data_limit_reset_strategy",
                    "enum",
                    "enum('no_reset','day','week','month','year')",
                )
                .not_null()
                .with_default("'no_reset'"),
            ],
        )
        .with_table(
            "node_usages",
            vec![
                id_column(),
                TargetColumnInfo::new("node_id", "int", "int"),
                TargetColumnInfo::new("uplink", "bigint", "bigint"),
                TargetColumnInfo::new("downlink", "bigint", "bigint"),
            ],
        )
        .with_table(
            "settings",
            vec![
                id_column(),
                TargetColumnInfo::new("general", "json", "json"),
                TargetColumnInfo::new("subscription", "json", "json"),
            ],
        )
        .with_table(
            "alembic_version",
            vec![TargetColumnInfo::new("version_num", "varchar", "varchar(32)").not_null()],
        )
}

pub fn inbound(id: i64, tag: &str) -> Row {
    let config = serde_json::json!({ "protocol": "vless", "port": 443, "network": "ws", "path": "/ws" });
    row(&[
        ("id", Value::Int(id)),
        ("tag", Value::text(tag)),
        ("config", Value::text(config.to_string())),
        ("node_id", Value::Int(1)),
    ])
}

/// A small Marzneshin snapshot with one orphaned usage row and a
/// duplicated inbound tag.
pub fn marzneshin_source() -> FakeSource {
    FakeSource::default()
        .with_table(
            "admins",
            vec![row(&[
                ("id", Value::Int(1)),
                ("username", Value::text("root")),
                ("hashed_password", Value::text("$2b$12$hash")),
                ("is_sudo", Value::text("True")),
                ("enabled", Value::Int(1)),
                ("all_services_access", Value::Bool(true)),
            ])],
        )
        .with_table(
            "nodes",
            vec![row(&[
                ("id", Value::Int(1)),
                ("name", Value::text("de-1")),
                ("address", Value::text("10.0.0.1")),
                ("port", Value::Int(53042)),
                ("status", Value::text("healthy")),
                ("connection_backend", Value::text("grpclib")),
            ])],
        )
        .with_table("inbounds", vec![inbound(1, "vless-in"), inbound(2, "vless-in")])
        .with_table(
            "hosts",
            vec![row(&[
                ("id", Value::Int(7)),
                ("name", Value::text("edge")),
                ("address", Value::text("edge.example.com")),
                ("port", Value::Int(443)),
                ("inbound_id", Value::Int(2)),
            ])],
        )
        .with_table(
            "users",
            vec![
                row(&[
                    ("id", Value::Int(1)),
                    ("username", Value::text("alice")),
                    ("key", Value::text("3f2a9c")),
                    ("enabled", Value::Bool(true)),
                    ("admin_id", Value::Int(1)),
                    ("data_limit_reset_strategy", Value::text("unknown")),
                ]),
                row(&[
                    ("id", Value::Int(2)),
                    ("username", Value::text("bob")),
                    ("key", Value::text("77aa01")),
                    ("enabled", Value::Bool(false)),
                    ("admin_id", Value::Null),
                    ("data_limit_reset_strategy", Value::text("month")),
                ]),
            ],
        )
        .with_table(
            "node_usages",
            vec![
                row(&[
                    ("id", Value::Int(1)),
                    ("node_id", Value::Int(1)),
                    ("uplink", Value::Int(100)),
                    ("downlink", Value::Int(200)),
                ]),
                row(&[
                    ("id", Value::Int(2)),
                    ("node_id", Value::Int(999)),
                    ("uplink", Value::Int(5)),
                    ("downlink", Value::Int(5)),
                ]),
            ],
        )
}

pub fn target() -> FakeTarget {
    FakeTarget::new(pasarguard_schema())
        .unique("admins", "username")
        .unique("inbounds", "tag")
        .unique("users", "username")
        .unique("core_configs", "name")
}
