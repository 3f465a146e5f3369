use std::collections::BTreeMap;

use pasarport_core::{Namespace, Row, Transform, UniquenessLedger, Value};

const VALID_ALPN: &[&str] = &[
    "h3",
    "h3,h2",
    "h3,h2,http/1.1",
    "none",
    "h2",
    "http/1.1",
    "h2,http/1.1",
];

const VALID_FINGERPRINTS: &[&str] = &[
    "none",
    "chrome",
    "firefox",
    "safari",
    "ios",
    "android",
    "edge",
    "360",
    "qq",
    "random",
    "randomized",
    "randomizednoalpn",
    "unsafe",
];

/// State a transform may consult besides the cell value.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub source_row: &'a Row,
    pub ledger: &'a UniquenessLedger,
    /// Inbound tags as they appear in the source, by inbound id.
    pub source_inbound_tags: &'a BTreeMap<i64, String>,
}

pub fn apply(transform: Transform, value: &Value, ctx: &TransformContext<'_>) -> Value {
    match transform {
        Transform::EnabledToStatus => {
            if value.is_truthy_flag() {
                Value::text("active")
            } else {
                Value::text("disabled")
            }
        }
        Transform::InvertBoolean => Value::Bool(!value.is_truthy_flag()),
        Transform::NodeStatus => Value::text("connecting"),
        Transform::ConnectionBackend => connection_backend(value),
        Transform::Alpn => alpn(value),
        Transform::Fingerprint => fingerprint(value),
        Transform::InboundIdToTag => inbound_tag(value, ctx),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(text) => text.is_empty(),
        Value::Bool(flag) => !flag,
        Value::Int(number) => *number == 0,
        _ => false,
    }
}

fn connection_backend(value: &Value) -> Value {
    let backend = value
        .render()
        .map(|text| text.trim().to_lowercase())
        .unwrap_or_default();
    match backend.as_str() {
        "rest" | "http" => Value::text("rest"),
        _ => Value::text("grpc"),
    }
}

fn alpn(value: &Value) -> Value {
    if is_empty(value) {
        return Value::Null;
    }
    let text = value.render().unwrap_or_default();
    let text = text.trim();
    let normalized = if VALID_ALPN.contains(&text) { text } else { "none" };
    if normalized.to_lowercase().contains("none") {
        Value::text("h2")
    } else {
        Value::text(normalized)
    }
}

fn fingerprint(value: &Value) -> Value {
    if is_empty(value) {
        return Value::text("none");
    }
    let text = value.render().unwrap_or_default().trim().to_lowercase();
    if VALID_FINGERPRINTS.contains(&text.as_str()) {
        Value::Text(text)
    } else {
        Value::text("none")
    }
}

fn inbound_tag(value: &Value, ctx: &TransformContext<'_>) -> Value {
    let Some(id) = value.as_i64() else {
        return Value::Null;
    };
    if let Some(tag) = ctx.ledger.lookup(Namespace::InboundTag, id) {
        return Value::text(tag);
    }
    ctx.source_inbound_tags
        .get(&id)
        .map_or(Value::Null, |tag| Value::text(tag.as_str()))
}
