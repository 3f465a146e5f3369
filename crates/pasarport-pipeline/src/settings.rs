//! The single `settings` row a fresh PasarGuard install expects.

use serde_json::{Value as Json, json};

use pasarport_core::{Row, TableColumns, Value};

fn all_enabled(events: &[&str]) -> Json {
    Json::Object(
        events
            .iter()
            .map(|event| (event.to_string(), Json::Bool(true)))
            .collect(),
    )
}

/// Default value for every settings column, as JSON documents.
pub fn default_settings() -> Vec<(&'static str, Json)> {
    let crud = ["create", "modify", "delete"];
    vec![
        (
            "telegram",
            json!({
                "enable": false,
                "token": null,
                "webhook_url": null,
                "webhook_secret": null,
                "proxy_url": null,
                "method": "webhook",
                "mini_app_login": true,
                "mini_app_web_url": "",
                "for_admins_only": true,
            }),
        ),
        (
            "discord",
            json!({ "enable": false, "token": null, "proxy_url": null }),
        ),
        (
            "webhook",
            json!({
                "enable": false,
                "webhooks": [],
                "days_left": [],
                "usage_percent": [],
                "timeout": 10,
                "recurrent": 1,
                "proxy_url": null,
            }),
        ),
        (
            "notification_settings",
            json!({
                "notify_telegram": false,
                "notify_discord": false,
                "telegram_api_token": null,
                "telegram_admin_id": null,
                "telegram_channel_id": null,
                "telegram_topic_id": null,
                "discord_webhook_url": null,
                "proxy_url": null,
                "max_retries": 3,
            }),
        ),
        (
            "notification_enable",
            json!({
                "admin": all_enabled(&["create", "modify", "delete", "reset_usage", "login"]),
                "core": all_enabled(&crud),
                "group": all_enabled(&crud),
                "host": all_enabled(&["create", "modify", "delete", "modify_hosts"]),
                "node": all_enabled(&["create", "modify", "delete", "connect", "error"]),
                "user": all_enabled(&[
                    "create",
                    "modify",
                    "delete",
                    "status_change",
                    "reset_data_usage",
                    "data_reset_by_next",
                    "subscription_revoked",
                ]),
                "user_template": all_enabled(&crud),
                "days_left": true,
                "percentage_reached": true,
            }),
        ),
        (
            "subscription",
            json!({
                "url_prefix": "",
                "update_interval": 12,
                "support_url": "https://t.me/",
                "profile_title": "Subscription",
                "host_status_filter": true,
                "rules": [],
                "manual_sub_request": all_enabled(&[
                    "links",
                    "links_base64",
                    "xray",
                    "sing_box",
                    "clash",
                    "clash_meta",
                    "outline",
                ]),
                "applications": [],
            }),
        ),
        (
            "general",
            json!({ "default_flow": "", "default_method": "chacha20-ietf-poly1305" }),
        ),
    ]
}

/// The default row, restricted to columns the live table has when its
/// metadata is known.
pub fn default_settings_row(columns: Option<&TableColumns>) -> Row {
    default_settings()
        .into_iter()
        .filter(|(name, _)| columns.is_none_or(|columns| columns.contains_key(*name)))
        .map(|(name, value)| (name.to_string(), Value::Json(value)))
        .collect()
}
