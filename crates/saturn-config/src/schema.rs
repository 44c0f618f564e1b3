// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless explicitly
/// disabled need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
}

/// How saturn finds inference endpoints on the local network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// DNS-SD service name browsed as `_<name>._tcp.local.`
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// How long a single browse pass listens for advertisements, in seconds
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
    /// Endpoint cache TTL in seconds.  Entries older than this are pruned
    /// and the background refresher re-browses before they expire.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Capability tags an endpoint must advertise to be considered,
    /// e.g. ["streaming", "tools"].  All listed tags must be present.
    #[serde(default)]
    pub require_features: Vec<String>,
    /// Required API type (TXT `api` key).  Unset accepts any.
    #[serde(default)]
    pub require_api: Option<String>,
    /// Minimum protocol version (TXT `version` key, dotted numeric).
    #[serde(default)]
    pub min_version: Option<String>,
    /// Instance names that are never selected.
    #[serde(default)]
    pub exclude_instances: Vec<String>,
    /// Allow falling back to the platform `dns-sd` tool when the native
    /// resolver finds nothing.
    #[serde(default = "default_true")]
    pub legacy_fallback: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            timeout_secs: default_discovery_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            require_features: Vec::new(),
            require_api: None,
            min_version: None,
            exclude_instances: Vec::new(),
            legacy_fallback: true,
        }
    }
}

fn default_service_name() -> String {
    "saturn".to_string()
}

fn default_discovery_timeout() -> u64 {
    3
}

fn default_cache_ttl() -> u64 {
    60
}

/// Request parameters forwarded to whichever endpoint the pool selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name hint forwarded to the endpoint.  Unset lets the endpoint
    /// use its loaded default.
    #[serde(default)]
    pub name: Option<String>,
    /// Maximum tokens to request in a single completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Optional system prompt override.  Unset uses the built-in prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Hard ceiling on model ↔ tool rounds within a single user turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Consecutive identical tool calls that count as a doom loop.
    #[serde(default = "default_doom_loop_threshold")]
    pub doom_loop_threshold: usize,
    /// Seconds to wait for an external approval decision before denying.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tool_rounds: default_max_tool_rounds(),
            doom_loop_threshold: default_doom_loop_threshold(),
            approval_timeout_secs: default_approval_timeout(),
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    50
}

fn default_doom_loop_threshold() -> usize {
    3
}

fn default_approval_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tool names that run without an approval round-trip.
    /// The default covers the read-only and coordination tools.
    #[serde(default = "default_auto_approve")]
    pub auto_approve: Vec<String>,
    /// Line cap applied to tool output before spooling the remainder.
    #[serde(default = "default_truncate_lines")]
    pub truncate_lines: usize,
    /// Byte cap applied to tool output before spooling the remainder.
    #[serde(default = "default_truncate_bytes")]
    pub truncate_bytes: usize,
    /// Seconds a shell command may run before it is killed.
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve: default_auto_approve(),
            truncate_lines: default_truncate_lines(),
            truncate_bytes: default_truncate_bytes(),
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

fn default_auto_approve() -> Vec<String> {
    [
        "read_file",
        "list_dir",
        "agent_status",
        "send_message",
        "list_agents",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_truncate_lines() -> usize {
    2000
}

fn default_truncate_bytes() -> usize {
    50 * 1024
}

fn default_shell_timeout() -> u64 {
    120
}

/// Per-agent advertisement on the coordination fabric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// DNS-SD service name agents register as `_<name>._tcp.local.`
    #[serde(default = "default_agent_service_name")]
    pub service_name: String,
    /// Instance name prefix; the full instance is `<prefix>-<agent-id>`.
    #[serde(default = "default_agent_prefix")]
    pub instance_prefix: String,
    /// Port carried in the SRV record.  Nothing connects to it — all
    /// coordination state rides in TXT — but DNS-SD requires one.
    #[serde(default = "default_coord_port")]
    pub port: u16,
    /// Seconds between background peer-message polls.
    #[serde(default = "default_listen_interval")]
    pub listen_interval_secs: u64,
    /// Seconds a peer browse pass listens for advertisements.
    #[serde(default = "default_coord_browse_timeout")]
    pub browse_timeout_secs: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            service_name: default_agent_service_name(),
            instance_prefix: default_agent_prefix(),
            port: default_coord_port(),
            listen_interval_secs: default_listen_interval(),
            browse_timeout_secs: default_coord_browse_timeout(),
        }
    }
}

fn default_agent_service_name() -> String {
    "saturn-agent".to_string()
}

fn default_agent_prefix() -> String {
    "saturn".to_string()
}

fn default_coord_port() -> u16 {
    7433
}

fn default_listen_interval() -> u64 {
    2
}

fn default_coord_browse_timeout() -> u64 {
    2
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
