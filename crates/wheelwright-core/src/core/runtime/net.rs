use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::config::{EnvSnapshot, NetworkConfig};

pub const USER_AGENT: &str = concat!("wheelwright/", env!("CARGO_PKG_VERSION"));

const PROXY_KEYS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// Decide whether HTTP clients honor the standard proxy variables.
///
/// - `WHEELWRIGHT_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `WHEELWRIGHT_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are enabled only when at least one proxy variable is set.
pub(crate) fn keep_proxies(snapshot: &EnvSnapshot) -> bool {
    match snapshot.var("WHEELWRIGHT_KEEP_PROXIES") {
        Some(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        }
        None => PROXY_KEYS
            .iter()
            .any(|key| snapshot.non_empty(key).is_some()),
    }
}

pub(crate) fn build_http_client(network: &NetworkConfig, timeout: Duration) -> Result<Client> {
    let builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout);
    let builder = if network.keep_proxies {
        builder
    } else {
        builder.no_proxy()
    };
    builder.build().context("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_proxies_defaults_to_enabled_when_proxy_env_is_set() {
        let snapshot = EnvSnapshot::testing(&[("HTTP_PROXY", "http://proxy.example")]);
        assert!(keep_proxies(&snapshot));
    }

    #[test]
    fn keep_proxies_defaults_to_disabled_without_proxy_env() {
        let snapshot = EnvSnapshot::testing(&[("https_proxy", "  ")]);
        assert!(!keep_proxies(&snapshot));
    }

    #[test]
    fn explicit_setting_wins() {
        let snapshot = EnvSnapshot::testing(&[
            ("WHEELWRIGHT_KEEP_PROXIES", "off"),
            ("HTTP_PROXY", "http://proxy.example"),
        ]);
        assert!(!keep_proxies(&snapshot));
        let snapshot = EnvSnapshot::testing(&[("WHEELWRIGHT_KEEP_PROXIES", "yes")]);
        assert!(keep_proxies(&snapshot));
    }
}
