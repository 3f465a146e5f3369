//! Proxy credentials for migrated users.
//!
//! Marzneshin stores a single opaque key per user and derives protocol
//! credentials from its XXH3-128 digest. Re-deriving them the same way keeps
//! existing client configurations working after the move.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::json;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_128;

const PASSWORD_LEN: usize = 22;
const SHADOWSOCKS_METHOD: &str = "chacha20-ietf-poly1305";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub id: Uuid,
    pub password: String,
}

impl ProxyCredentials {
    /// Deterministic credentials for a user key.
    pub fn derive(key: &str) -> Self {
        let digest = xxh3_128(key.as_bytes()).to_be_bytes();
        let mut password = hex::encode(digest);
        password.truncate(PASSWORD_LEN);
        Self {
            id: Uuid::from_bytes(digest),
            password,
        }
    }

    pub fn random() -> Self {
        let password = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();
        Self {
            id: Uuid::new_v4(),
            password,
        }
    }

    /// Derive from `key` when there is one, else generate.
    pub fn for_key(key: Option<&str>) -> Self {
        match key.filter(|key| !key.is_empty()) {
            Some(key) => Self::derive(key),
            None => Self::random(),
        }
    }

    pub fn to_proxy_settings(&self) -> serde_json::Value {
        let id = self.id.to_string();
        json!({
            "vmess": { "id": id },
            "vless": { "id": id, "flow": "" },
            "trojan": { "password": self.password },
            "shadowsocks": { "password": self.password, "method": SHADOWSOCKS_METHOD },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let first = ProxyCredentials::derive("c0ffee");
        let second = ProxyCredentials::derive("c0ffee");
        assert_eq!(first, second);
        assert_ne!(first, ProxyCredentials::derive("c0ffef"));
    }

    #[test]
    fn password_is_digest_prefix() {
        let creds = ProxyCredentials::derive("user-key");
        let digest = xxh3_128(b"user-key");
        assert_eq!(creds.password, format!("{digest:032x}")[..PASSWORD_LEN]);
        assert_eq!(creds.id.as_u128(), digest);
    }

    #[test]
    fn empty_key_falls_back_to_random() {
        let creds = ProxyCredentials::for_key(Some(""));
        assert_eq!(creds.password.len(), PASSWORD_LEN);
        assert!(creds.password.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_ne!(creds, ProxyCredentials::for_key(None));
    }

    #[test]
    fn proxy_settings_share_credentials_across_protocols() {
        let creds = ProxyCredentials::derive("abc");
        let settings = creds.to_proxy_settings();
        let id = creds.id.to_string();
        assert_eq!(settings["vmess"]["id"], id);
        assert_eq!(settings["vless"]["id"], id);
        assert_eq!(settings["vless"]["flow"], "");
        assert_eq!(settings["trojan"]["password"], creds.password);
        assert_eq!(settings["shadowsocks"]["method"], SHADOWSOCKS_METHOD);
    }
}
