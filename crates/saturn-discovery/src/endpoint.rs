// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

/// Health state of an advertised endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Health {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Unhealthy => write!(f, "unhealthy"),
            Health::Unknown => write!(f, "unknown"),
        }
    }
}

/// One resolved service advertisement.  Immutable after resolution; keyed by
/// `instance` (unique per advertisement).
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub instance: String,
    pub host: String,
    pub port: u16,
    /// Remote base URL for beacons that proxy a cloud API.  When set, the
    /// endpoint is addressed through it instead of `host:port` and the
    /// health check is skipped.
    pub api_base: Option<String>,
    /// 0–100; lower is preferred.
    pub priority: u8,
    /// API dialect, e.g. "openai".
    pub api: String,
    /// Capability tags such as "streaming", "tools", "vision".
    pub features: Vec<String>,
    /// Session-scoped bearer token; never persisted.
    pub ephemeral_key: Option<String>,
    pub version: Option<String>,
    pub max_concurrent: u32,
    pub current_load: u32,
    pub security: Option<String>,
    pub health_endpoint: Option<String>,
    pub models: Vec<String>,
    pub gpu: Option<String>,
    pub vram_gb: Option<u32>,
    pub health: Health,
}

impl EndpointDescriptor {
    /// Build a descriptor from resolved SRV data plus raw TXT key=value pairs.
    ///
    /// Unknown keys are ignored; missing keys take the wire defaults
    /// (priority=100, api="openai", features=∅, max_concurrent=0,
    /// current_load=0, health=unknown).
    pub fn from_txt(
        instance: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        txt: &HashMap<String, String>,
    ) -> Self {
        let list = |key: &str| -> Vec<String> {
            txt.get(key)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            instance: instance.into(),
            host: host.into(),
            port,
            api_base: txt.get("api_base").cloned(),
            priority: txt
                .get("priority")
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            api: txt.get("api").cloned().unwrap_or_else(|| "openai".into()),
            features: list("features"),
            ephemeral_key: txt.get("ephemeral_key").cloned(),
            version: txt.get("version").cloned(),
            max_concurrent: txt
                .get("max_concurrent")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            current_load: txt
                .get("current_load")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            security: txt.get("security").cloned(),
            health_endpoint: txt.get("health_endpoint").cloned(),
            models: list("models"),
            gpu: txt.get("gpu").cloned(),
            vram_gb: txt.get("vram_gb").and_then(|v| v.parse().ok()),
            health: Health::Unknown,
        }
    }

    /// Remaining request slots: `max(0, max_concurrent − current_load)`.
    pub fn available(&self) -> u32 {
        self.max_concurrent.saturating_sub(self.current_load)
    }

    /// Load as a fraction of capacity, clamped to [0, 1].
    /// An endpoint with no declared capacity is treated as fully loaded.
    pub fn load_fraction(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 1.0;
        }
        (self.current_load as f64 / self.max_concurrent as f64).clamp(0.0, 1.0)
    }

    /// True when this endpoint proxies a remote API (`api_base` set).
    pub fn is_remote(&self) -> bool {
        self.api_base.is_some()
    }

    /// The base URL requests are addressed to: the remote base when present,
    /// else `http://host:port`.
    pub fn base_url(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn txt(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_keys_take_wire_defaults() {
        let ep = EndpointDescriptor::from_txt("a", "10.0.0.1", 8080, &txt(&[]));
        assert_eq!(ep.priority, 100);
        assert_eq!(ep.api, "openai");
        assert!(ep.features.is_empty());
        assert_eq!(ep.max_concurrent, 0);
        assert_eq!(ep.current_load, 0);
        assert_eq!(ep.health, Health::Unknown);
    }

    #[test]
    fn all_recognized_keys_are_parsed() {
        let ep = EndpointDescriptor::from_txt(
            "beacon",
            "10.0.0.2",
            11434,
            &txt(&[
                ("priority", "10"),
                ("api", "openai"),
                ("api_base", "https://example/api/v1"),
                ("ephemeral_key", "sk-x"),
                ("features", "streaming,tools,vision"),
                ("version", "1.2.0"),
                ("max_concurrent", "4"),
                ("current_load", "1"),
                ("security", "none"),
                ("health_endpoint", "/v1/health"),
                ("models", "llama3,qwen2.5"),
                ("gpu", "rtx4090"),
                ("vram_gb", "24"),
            ]),
        );
        assert_eq!(ep.priority, 10);
        assert_eq!(ep.api_base.as_deref(), Some("https://example/api/v1"));
        assert_eq!(ep.ephemeral_key.as_deref(), Some("sk-x"));
        assert_eq!(ep.features, vec!["streaming", "tools", "vision"]);
        assert_eq!(ep.version.as_deref(), Some("1.2.0"));
        assert_eq!(ep.max_concurrent, 4);
        assert_eq!(ep.current_load, 1);
        assert_eq!(ep.models, vec!["llama3", "qwen2.5"]);
        assert_eq!(ep.vram_gb, Some(24));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let ep = EndpointDescriptor::from_txt(
            "a",
            "h",
            1,
            &txt(&[("priority", "5"), ("future_key", "whatever")]),
        );
        assert_eq!(ep.priority, 5);
    }

    #[test]
    fn unparseable_numeric_falls_back_to_default() {
        let ep = EndpointDescriptor::from_txt("a", "h", 1, &txt(&[("priority", "high")]));
        assert_eq!(ep.priority, 100);
    }

    #[test]
    fn available_is_capacity_minus_load_floored_at_zero() {
        let mut ep = EndpointDescriptor::from_txt(
            "a",
            "h",
            1,
            &txt(&[("max_concurrent", "4"), ("current_load", "1")]),
        );
        assert_eq!(ep.available(), 3);
        ep.current_load = 9;
        assert_eq!(ep.available(), 0);
    }

    #[test]
    fn load_fraction_with_zero_capacity_is_one() {
        let ep = EndpointDescriptor::from_txt("a", "h", 1, &txt(&[]));
        assert_eq!(ep.load_fraction(), 1.0);
    }

    #[test]
    fn load_fraction_is_clamped() {
        let ep = EndpointDescriptor::from_txt(
            "a",
            "h",
            1,
            &txt(&[("max_concurrent", "2"), ("current_load", "5")]),
        );
        assert_eq!(ep.load_fraction(), 1.0);
    }

    #[test]
    fn base_url_prefers_remote_base() {
        let ep = EndpointDescriptor::from_txt(
            "a",
            "10.0.0.1",
            8080,
            &txt(&[("api_base", "https://example/api/v1/")]),
        );
        assert_eq!(ep.base_url(), "https://example/api/v1");
        assert!(ep.is_remote());
    }

    #[test]
    fn base_url_local_uses_host_port() {
        let ep = EndpointDescriptor::from_txt("a", "10.0.0.1", 8080, &txt(&[]));
        assert_eq!(ep.base_url(), "http://10.0.0.1:8080");
        assert!(!ep.is_remote());
    }

    #[test]
    fn feature_list_trims_whitespace() {
        let ep =
            EndpointDescriptor::from_txt("a", "h", 1, &txt(&[("features", "streaming, tools ,")]));
        assert_eq!(ep.features, vec!["streaming", "tools"]);
    }
}
