use chrono::Utc;
use serde_json::json;

use pasarport_core::{Namespace, Row, UniquenessLedger, Value, row_id};

use crate::credentials::ProxyCredentials;

/// Placeholder CA for nodes; PasarGuard requires one and Marzneshin has none.
const DEFAULT_SERVER_CA: &str = "LS0tLS1CRUdJTiBQVUJMSUMgS0VZLS0tLS0KTUlJQklqQU5CZ2txaGtpRzl3MEJBUUVGQUFPQ0FROEFNSUlCQ2dLQ0FRRUF0OGl2SzVUOFQ4UGYxT1FWbVk3awpMaG1HNHFpWXh0SE9rUkcyOEpMTHZq";
const DEFAULT_NODE_PORT: i64 = 62050;

fn missing(row: &Row, column: &str) -> bool {
    row.get(column).is_none_or(Value::is_null)
}

fn blank(row: &Row, column: &str) -> bool {
    row.get(column).is_none_or(Value::is_blank)
}

fn now() -> Value {
    Value::Timestamp(Utc::now().naive_utc())
}

/// Fill target-only columns and enforce uniqueness for one converted row.
///
/// `source` is the untouched source row; `target` holds the output of the
/// column rules.
pub fn apply_computed(table: &str, source: &Row, target: &mut Row, ledger: &mut UniquenessLedger) {
    match table {
        "users" => users(source, target, ledger),
        "inbounds" => inbounds(source, target, ledger),
        "nodes" => nodes(target),
        "admins" => admins(target),
        "hosts" => hosts(source, target, ledger),
        "groups" => groups(source, target),
        "node_usages" => node_usages(source, target),
        "admin_usage_logs" => admin_usage_logs(target),
        _ => {}
    }
}

fn users(source: &Row, target: &mut Row, ledger: &mut UniquenessLedger) {
    if !target.contains_key("proxy_settings") {
        let key = source.get("key").and_then(Value::as_str);
        let settings = ProxyCredentials::for_key(key).to_proxy_settings();
        target.insert("proxy_settings".into(), Value::Json(settings));
    }

    if let Some(username) = target.get("username") {
        let id = row_id(source);
        let candidate = match username.render().filter(|name| !name.trim().is_empty()) {
            Some(name) => name,
            None => id.map_or_else(|| "user".to_string(), |id| format!("user_{id}")),
        };
        let resolved = match id {
            Some(id) => ledger.resolve_for(Namespace::Username, id, &candidate),
            None => ledger.resolve(Namespace::Username, &candidate),
        };
        target.insert("username".into(), Value::Text(resolved));
    }
}

fn inbounds(source: &Row, target: &mut Row, ledger: &mut UniquenessLedger) {
    let id = row_id(source);
    if let Some(tag) = id.and_then(|id| ledger.lookup(Namespace::InboundTag, id)) {
        target.insert("tag".into(), Value::text(tag));
        return;
    }
    let Some(current) = target.get("tag") else {
        return;
    };
    let candidate = match current.render().filter(|tag| !tag.trim().is_empty()) {
        Some(tag) => tag,
        None => id.map_or_else(|| "inbound_unknown".to_string(), |id| format!("inbound_{id}")),
    };
    let resolved = match id {
        Some(id) => ledger.resolve_for(Namespace::InboundTag, id, &candidate),
        None => ledger.resolve(Namespace::InboundTag, &candidate),
    };
    target.insert("tag".into(), Value::Text(resolved));
}

fn nodes(target: &mut Row) {
    if blank(target, "server_ca") {
        target.insert("server_ca".into(), Value::text(DEFAULT_SERVER_CA));
    }
    if !target.contains_key("status") {
        target.insert("status".into(), Value::text("connecting"));
    }
    if missing(target, "api_port") {
        let port = target
            .get("port")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_NODE_PORT);
        target.insert("api_port".into(), Value::Int(port + 1));
    }
}

fn admins(target: &mut Row) {
    if !target.contains_key("used_traffic") {
        target.insert("used_traffic".into(), Value::Int(0));
    }
    if missing(target, "notification_enable") {
        target.insert(
            "notification_enable".into(),
            Value::Json(json!({
                "create": false,
                "modify": false,
                "delete": false,
                "status_change": false,
                "reset_data_usage": false,
                "data_reset_by_next": false,
                "subscription_revoked": false,
            })),
        );
    }
}

fn hosts(source: &Row, target: &mut Row, ledger: &UniquenessLedger) {
    if missing(target, "priority") {
        target.insert("priority".into(), Value::Int(1));
    }
    if blank(target, "status") {
        target.insert("status".into(), Value::text("[]"));
    }
    if blank(target, "path") {
        target.insert("path".into(), Value::text("/"));
    }
    let resolved = source
        .get("inbound_id")
        .and_then(Value::as_i64)
        .and_then(|id| ledger.lookup(Namespace::InboundTag, id));
    if let Some(tag) = resolved {
        target.insert("inbound_tag".into(), Value::text(tag));
    }
}

fn groups(source: &Row, target: &mut Row) {
    if blank(target, "name") {
        if let Some(description) = source.get("description").filter(|value| !value.is_blank()) {
            target.insert("name".into(), description.clone());
        }
    }
}

fn node_usages(source: &Row, target: &mut Row) {
    if missing(target, "uplink") {
        if let Some(used) = source.get("used_traffic").filter(|value| !value.is_null()) {
            target.insert("uplink".into(), used.clone());
        }
    }
}

fn admin_usage_logs(target: &mut Row) {
    if missing(target, "used_traffic_at_reset") {
        target.insert("used_traffic_at_reset".into(), Value::Int(0));
    }
    if missing(target, "reset_at") {
        target.insert("reset_at".into(), now());
    }
}
