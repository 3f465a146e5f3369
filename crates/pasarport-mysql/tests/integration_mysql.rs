use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};

use pasarport_core::{ColumnKind, InsertMode, Row, TargetStore, Value};
use pasarport_mysql::MySqlTargetStore;

const SETUP: &[&str] = &[
    "DROP TABLE IF EXISTS pasarport_it_inbounds",
    r#"CREATE TABLE pasarport_it_inbounds (
        id INT AUTO_INCREMENT PRIMARY KEY,
        tag VARCHAR(64) NOT NULL UNIQUE,
        status ENUM('active','on_hold') NOT NULL,
        is_enabled TINYINT(1) NOT NULL DEFAULT 1,
        config JSON NULL,
        created_at DATETIME NULL
    )"#,
];

fn options() -> Option<MySqlConnectOptions> {
    let url = env::var("TEST_MYSQL_URL").ok()?;
    MySqlConnectOptions::from_str(&url).ok()
}

fn inbound(id: i64, tag: &str) -> Row {
    [
        ("id".to_string(), Value::Int(id)),
        ("tag".to_string(), Value::text(tag)),
        ("status".to_string(), Value::text("active")),
        ("is_enabled".to_string(), Value::Bool(true)),
        (
            "config".to_string(),
            Value::Json(serde_json::json!({ "port": 443 })),
        ),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn target_store_round_trip() -> Result<()> {
    let Some(options) = options() else {
        eprintln!("TEST_MYSQL_URL not set, skipping");
        return Ok(());
    };

    let mut admin = MySqlConnection::connect_with(&options)
        .await
        .context("connecting with TEST_MYSQL_URL")?;
    for statement in SETUP {
        sqlx::query(statement)
            .execute(&mut admin)
            .await
            .with_context(|| format!("running setup: {statement}"))?;
    }

    let mut store = MySqlTargetStore::connect(options, "test").await?;

    let schema = store.introspect().await?;
    let table = schema
        .table("pasarport_it_inbounds")
        .context("test table introspected")?;
    assert_eq!(table["status"].kind, ColumnKind::Enum);
    assert_eq!(table["status"].enum_values, vec!["active", "on_hold"]);
    assert!(table["status"].is_required());
    assert_eq!(table["is_enabled"].kind, ColumnKind::Bool);
    assert_eq!(table["tag"].max_length, Some(64));
    assert!(table["id"].auto_increment);

    let columns: Vec<String> = ["id", "tag", "status", "is_enabled", "config"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    let rows = vec![inbound(1, "vless-in"), inbound(2, "vmess-in")];
    let written = store
        .insert_rows("pasarport_it_inbounds", &columns, &rows, InsertMode::Strict)
        .await?;
    assert_eq!(written, 2);

    let duplicate = vec![inbound(3, "vless-in")];
    let strict = store
        .insert_rows("pasarport_it_inbounds", &columns, &duplicate, InsertMode::Strict)
        .await;
    let err = strict.expect_err("duplicate tag must be rejected");
    assert!(!err.is_fatal());

    let ignored = store
        .insert_rows(
            "pasarport_it_inbounds",
            &columns,
            &duplicate,
            InsertMode::IgnoreDuplicates,
        )
        .await?;
    assert_eq!(ignored, 0);

    let tags = store.select_column("pasarport_it_inbounds", "tag").await?;
    assert_eq!(tags.len(), 2);
    assert!(tags.contains(&Value::text("vless-in")));
    assert_eq!(store.count_rows("pasarport_it_inbounds").await?, 2);
    assert_eq!(store.max_id("pasarport_it_inbounds", "id").await?, Some(2));
    store.set_auto_increment("pasarport_it_inbounds", 3).await?;
    assert!(store.table_exists("pasarport_it_inbounds").await?);
    assert!(!store.table_exists("pasarport_it_missing").await?);

    store.set_foreign_key_checks(false).await?;
    store.clear_table("pasarport_it_inbounds").await?;
    store.set_foreign_key_checks(true).await?;
    assert_eq!(store.count_rows("pasarport_it_inbounds").await?, 0);

    sqlx::query("DROP TABLE IF EXISTS pasarport_it_inbounds")
        .execute(&mut admin)
        .await?;
    store.close().await?;
    Ok(())
}
