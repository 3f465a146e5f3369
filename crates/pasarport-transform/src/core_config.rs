//! Fan-out of Marzneshin inbounds into PasarGuard core configs.
//!
//! Each inbound row carries its own JSON config. It becomes a standalone Xray
//! document holding that single inbound.

use chrono::Utc;
use serde_json::{Map, Value as Json, json};

use pasarport_core::{Namespace, Row, UniquenessLedger, Value, row_id};

use crate::errors::TransformError;

/// Build the `core_configs` row for one source inbound.
///
/// The inbound's tag is resolved in the ledger first, so later `inbounds`
/// and `hosts` rows see the same value even when this row is dropped.
pub fn build_core_config(
    inbound: &Row,
    ledger: &mut UniquenessLedger,
) -> Result<Row, TransformError> {
    let id = row_id(inbound);
    let label = id.map_or_else(|| "?".to_string(), |id| id.to_string());

    let tag = inbound
        .get("tag")
        .and_then(Value::render)
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .ok_or_else(|| TransformError::MissingTag {
            inbound: label.clone(),
        })?;

    let resolved_tag = match id {
        Some(id) => ledger.resolve_for(Namespace::InboundTag, id, &tag),
        None => ledger.resolve(Namespace::InboundTag, &tag),
    };
    let name = ledger.resolve(Namespace::CoreConfigName, &tag);

    let config = parse_config(inbound.get("config"), &label)?;
    let xray_inbound = build_inbound(&config, &resolved_tag, &label)?;

    let document = json!({
        "log": { "loglevel": "info" },
        "inbounds": [xray_inbound],
        "outbounds": [
            { "protocol": "freedom", "tag": "DIRECT" },
            { "protocol": "blackhole", "tag": "BLOCK" },
        ],
        "routing": {
            "domainStrategy": "AsIs",
            "rules": [
                { "ip": ["geoip:private"], "outboundTag": "BLOCK", "type": "field" },
            ],
        },
    });

    let mut row = Row::new();
    row.insert("name".into(), Value::Text(name));
    row.insert("config".into(), Value::Text(document.to_string()));
    row.insert("exclude_inbound_tags".into(), Value::Null);
    row.insert("fallbacks_inbound_tags".into(), Value::Null);
    row.insert("created_at".into(), Value::Timestamp(Utc::now().naive_utc()));
    Ok(row)
}

fn parse_config(raw: Option<&Value>, label: &str) -> Result<Map<String, Json>, TransformError> {
    let invalid = |reason: String| TransformError::InvalidConfig {
        inbound: label.to_string(),
        reason,
    };
    let parsed = match raw {
        None => Json::Object(Map::new()),
        Some(Value::Json(json)) => json.clone(),
        Some(Value::Text(text)) => {
            serde_json::from_str(text).map_err(|err| invalid(err.to_string()))?
        }
        Some(other) => return Err(invalid(format!("unexpected value {other}"))),
    };
    match parsed {
        Json::Object(map) => Ok(map),
        other => Err(invalid(format!("expected an object, got {other}"))),
    }
}

fn str_field(config: &Map<String, Json>, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Json::as_str)
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}

fn lowered(config: &Map<String, Json>, key: &str, default: &str) -> String {
    str_field(config, key)
        .unwrap_or_else(|| default.to_string())
        .to_lowercase()
}

/// `host` may be a string or a list of strings.
fn hosts(config: &Map<String, Json>) -> Vec<Json> {
    match config.get("host") {
        Some(Json::Array(items)) => items.clone(),
        Some(Json::String(host)) if !host.trim().is_empty() => vec![Json::String(host.clone())],
        _ => Vec::new(),
    }
}

fn build_inbound(
    config: &Map<String, Json>,
    tag: &str,
    label: &str,
) -> Result<Json, TransformError> {
    let protocol = lowered(config, "protocol", "");
    let mut settings = json!({ "clients": [] });
    if protocol == "shadowsocks" {
        settings["network"] = Json::String(str_field(config, "network").unwrap_or_else(|| "tcp".into()));
    }

    let mut inbound = json!({
        "tag": tag,
        "listen": "0.0.0.0",
        "port": config.get("port").cloned().unwrap_or(Json::Null),
        "protocol": protocol,
        "settings": settings,
    });

    if let Some(stream) = build_stream_settings(config, label)? {
        inbound["streamSettings"] = stream;
    }
    Ok(inbound)
}

fn build_stream_settings(
    config: &Map<String, Json>,
    label: &str,
) -> Result<Option<Json>, TransformError> {
    let network = lowered(config, "network", "tcp");
    let tls = lowered(config, "tls", "none");
    let header_type = str_field(config, "header_type");

    if tls == "none" && network == "tcp" && header_type.is_none() {
        return Ok(None);
    }
    if tls == "reality" {
        return Err(TransformError::RealityKeyUnavailable {
            inbound: label.to_string(),
        });
    }

    let mut stream = Map::new();
    let path = str_field(config, "path");
    let host_list = hosts(config);

    match network.as_str() {
        "ws" => {
            stream.insert("network".into(), json!("ws"));
            let mut ws = Map::new();
            if let Some(path) = &path {
                ws.insert("path".into(), json!(path));
            }
            if let Some(first) = host_list.first() {
                ws.insert("headers".into(), json!({ "Host": first }));
            }
            if !ws.is_empty() {
                stream.insert("wsSettings".into(), Json::Object(ws));
            }
        }
        "grpc" => {
            stream.insert("network".into(), json!("grpc"));
            if let Some(service) = str_field(config, "serviceName").or_else(|| path.clone()) {
                stream.insert("grpcSettings".into(), json!({ "serviceName": service }));
            }
        }
        "http" => {
            stream.insert("network".into(), json!("http"));
            let mut http = Map::new();
            if let Some(path) = &path {
                http.insert("path".into(), json!(path));
            }
            if !host_list.is_empty() {
                http.insert("host".into(), Json::Array(host_list.clone()));
            }
            if !http.is_empty() {
                stream.insert("httpSettings".into(), Json::Object(http));
            }
        }
        "tcp" => {
            stream.insert("network".into(), json!("tcp"));
            if header_type.as_deref() == Some("http") {
                let mut headers = Map::new();
                if !host_list.is_empty() {
                    headers.insert("Host".into(), Json::Array(host_list.clone()));
                }
                stream.insert(
                    "tcpSettings".into(),
                    json!({
                        "header": {
                            "type": "http",
                            "request": {
                                "version": "1.1",
                                "method": "GET",
                                "path": [path.clone().unwrap_or_else(|| "/".into())],
                                "headers": headers,
                            },
                        },
                    }),
                );
            }
        }
        _ => {}
    }

    match tls.as_str() {
        "tls" => {
            stream.insert("security".into(), json!("tls"));
            let mut tls_settings = Map::new();
            match config.get("sni") {
                Some(Json::Array(items)) if !items.is_empty() => {
                    tls_settings.insert("serverName".into(), items[0].clone());
                }
                Some(Json::String(sni)) if !sni.trim().is_empty() => {
                    tls_settings.insert("serverName".into(), json!(sni));
                }
                _ => {}
            }
            match config.get("alpn") {
                Some(Json::Array(items)) if !items.is_empty() => {
                    tls_settings.insert("alpn".into(), Json::Array(items.clone()));
                }
                Some(Json::String(alpn)) if !alpn.is_empty() => {
                    tls_settings.insert("alpn".into(), json!([alpn]));
                }
                _ => {}
            }
            if config.get("allowinsecure").and_then(Json::as_bool) == Some(true) {
                tls_settings.insert("allowInsecure".into(), json!(true));
            }
            if !tls_settings.is_empty() {
                stream.insert("tlsSettings".into(), Json::Object(tls_settings));
            }
        }
        "xtls" => {
            stream.insert("security".into(), json!("xtls"));
        }
        _ => {}
    }

    Ok((!stream.is_empty()).then_some(Json::Object(stream)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(id: i64, tag: &str, config: Json) -> Row {
        Row::from([
            ("id".to_string(), Value::Int(id)),
            ("tag".to_string(), Value::text(tag)),
            ("config".to_string(), Value::Text(config.to_string())),
        ])
    }

    fn document(row: &Row) -> Json {
        let text = row.get("config").and_then(Value::as_str).expect("config text");
        serde_json::from_str(text).expect("valid json")
    }

    #[test]
    fn builds_single_inbound_document() {
        let mut ledger = UniquenessLedger::new();
        let row = build_core_config(
            &inbound(1, "vless-ws", json!({
                "protocol": "VLESS", "port": 443, "network": "ws",
                "path": "/ws", "host": ["cdn.example.com"], "tls": "tls",
                "sni": "example.com", "alpn": "h2", "allowinsecure": true,
            })),
            &mut ledger,
        )
        .expect("core config");

        assert_eq!(row.get("name"), Some(&Value::text("vless-ws")));
        assert_eq!(row.get("exclude_inbound_tags"), Some(&Value::Null));
        let doc = document(&row);
        let xray = &doc["inbounds"][0];
        assert_eq!(xray["tag"], "vless-ws");
        assert_eq!(xray["protocol"], "vless");
        assert_eq!(xray["listen"], "0.0.0.0");
        assert_eq!(xray["streamSettings"]["network"], "ws");
        assert_eq!(xray["streamSettings"]["wsSettings"]["path"], "/ws");
        assert_eq!(xray["streamSettings"]["wsSettings"]["headers"]["Host"], "cdn.example.com");
        assert_eq!(xray["streamSettings"]["tlsSettings"]["serverName"], "example.com");
        assert_eq!(xray["streamSettings"]["tlsSettings"]["alpn"], json!(["h2"]));
        assert_eq!(xray["streamSettings"]["tlsSettings"]["allowInsecure"], true);
        assert_eq!(doc["outbounds"][1]["tag"], "BLOCK");
        assert_eq!(doc["routing"]["rules"][0]["ip"], json!(["geoip:private"]));
    }

    #[test]
    fn plain_tcp_has_no_stream_settings() {
        let mut ledger = UniquenessLedger::new();
        let row = build_core_config(
            &inbound(1, "ss", json!({"protocol": "shadowsocks", "port": 1080})),
            &mut ledger,
        )
        .expect("core config");
        let doc = document(&row);
        assert!(doc["inbounds"][0].get("streamSettings").is_none());
        assert_eq!(doc["inbounds"][0]["settings"]["network"], "tcp");
    }

    #[test]
    fn grpc_and_tcp_http_header_transports() {
        let mut ledger = UniquenessLedger::new();
        let grpc = build_core_config(
            &inbound(1, "g", json!({"protocol": "vmess", "network": "grpc", "path": "svc"})),
            &mut ledger,
        )
        .expect("grpc");
        assert_eq!(
            document(&grpc)["inbounds"][0]["streamSettings"]["grpcSettings"]["serviceName"],
            "svc"
        );

        let tcp = build_core_config(
            &inbound(2, "t", json!({
                "protocol": "vmess", "network": "tcp", "header_type": "http", "host": "a.example"
            })),
            &mut ledger,
        )
        .expect("tcp");
        let header = &document(&tcp)["inbounds"][0]["streamSettings"]["tcpSettings"]["header"];
        assert_eq!(header["type"], "http");
        assert_eq!(header["request"]["path"], json!(["/"]));
        assert_eq!(header["request"]["headers"]["Host"], json!(["a.example"]));
    }

    #[test]
    fn reality_inbound_is_rejected_but_tag_is_reserved() {
        let mut ledger = UniquenessLedger::new();
        let err = build_core_config(
            &inbound(4, "reality-in", json!({"protocol": "vless", "tls": "reality"})),
            &mut ledger,
        )
        .expect_err("reality");
        assert!(matches!(err, TransformError::RealityKeyUnavailable { .. }));
        assert_eq!(ledger.lookup(Namespace::InboundTag, 4), Some("reality-in"));
    }

    #[test]
    fn duplicate_tags_get_suffixed_names_and_tags() {
        let mut ledger = UniquenessLedger::new();
        let config = json!({"protocol": "vless"});
        let first = build_core_config(&inbound(1, "vless-in", config.clone()), &mut ledger)
            .expect("first");
        let second = build_core_config(&inbound(2, "vless-in", config), &mut ledger)
            .expect("second");
        assert_eq!(first.get("name"), Some(&Value::text("vless-in")));
        assert_eq!(second.get("name"), Some(&Value::text("vless-in_2")));
        assert_eq!(document(&second)["inbounds"][0]["tag"], "vless-in_2");
        assert_eq!(ledger.lookup(Namespace::InboundTag, 2), Some("vless-in_2"));
    }

    #[test]
    fn unreadable_config_and_missing_tag_fail() {
        let mut ledger = UniquenessLedger::new();
        let mut broken = inbound(1, "x", json!({}));
        broken.insert("config".into(), Value::text("{not json"));
        assert!(matches!(
            build_core_config(&broken, &mut ledger),
            Err(TransformError::InvalidConfig { .. })
        ));

        let untagged = inbound(2, "  ", json!({}));
        assert!(matches!(
            build_core_config(&untagged, &mut ledger),
            Err(TransformError::MissingTag { .. })
        ));
    }
}
