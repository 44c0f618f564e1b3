// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-agent mDNS advertisement and peer discovery.
//!
//! Each agent registers `_<service>._tcp.local.` under the instance name
//! `<prefix>-<agent-id>`; status and the bounded message ring ride in the
//! TXT record.  Peers learn everything by browsing — there is no direct
//! connection between agents.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, warn};

use saturn_config::CoordinationConfig;

use crate::coordination::Coordination;
use crate::error::CoordError;
use crate::status::{AgentMessage, AgentStatus, AgentStatusRecord, MessageRing};
use crate::txt::{encode_txt, parse_messages, parse_record};

pub struct Coordinator {
    agent_id: String,
    /// Full DNS-SD type, e.g. `_saturn-agent._tcp.local.`
    service_type: String,
    /// `<prefix>-<agent-id>`
    instance: String,
    host: String,
    port: u16,
    browse_timeout: Duration,
    daemon: ServiceDaemon,
    state: Mutex<(AgentStatusRecord, MessageRing)>,
    seen: Mutex<HashSet<String>>,
}

impl Coordinator {
    /// Create the daemon and publish the initial (idle) advertisement.
    pub fn new(agent_id: impl Into<String>, cfg: &CoordinationConfig) -> Result<Self, CoordError> {
        let agent_id = agent_id.into();
        let host = hostname::get()
            .map(|h| format!("{}.local.", h.to_string_lossy()))
            .unwrap_or_else(|_| "localhost.local.".to_string());
        let coordinator = Self {
            service_type: format!("_{}._tcp.local.", cfg.service_name),
            instance: format!("{}-{}", cfg.instance_prefix, agent_id),
            host,
            port: cfg.port,
            browse_timeout: Duration::from_secs(cfg.browse_timeout_secs),
            daemon: ServiceDaemon::new()?,
            state: Mutex::new((AgentStatusRecord::new(&agent_id), MessageRing::new())),
            seen: Mutex::new(HashSet::new()),
            agent_id,
        };
        coordinator.republish()?;
        Ok(coordinator)
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    fn fullname(&self) -> String {
        format!("{}.{}", self.instance, self.service_type)
    }

    /// Re-register the service with the current TXT payload.
    fn republish(&self) -> Result<(), CoordError> {
        let txt = {
            let state = self.state.lock().unwrap();
            encode_txt(&state.0, &state.1)
        };
        let info = ServiceInfo::new(
            &self.service_type,
            &self.instance,
            &self.host,
            "",
            self.port,
            txt,
        )
        .map_err(|e| CoordError::RegisterFailed(e.to_string()))?
        .enable_addr_auto();

        // A fresh register of the same fullname replaces the previous
        // advertisement; drop the old one first so caches converge faster.
        let _ = self.daemon.unregister(&self.fullname());
        self.daemon
            .register(info)
            .map_err(|e| CoordError::RegisterFailed(e.to_string()))?;
        debug!(instance = %self.instance, "republished agent advertisement");
        Ok(())
    }

    /// Browse the agent service type and hand every resolved peer's TXT map
    /// to `collect`.
    async fn browse_peers<T>(
        &self,
        collect: impl Fn(&HashMap<String, String>) -> Option<T>,
    ) -> Result<Vec<T>, CoordError> {
        let receiver = self
            .daemon
            .browse(&self.service_type)
            .map_err(|e| CoordError::BrowseFailed(e.to_string()))?;

        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + self.browse_timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(ev)) => ev,
                Ok(Err(_)) | Err(_) => break,
            };
            if let ServiceEvent::ServiceResolved(info) = event {
                let txt: HashMap<String, String> = info
                    .get_properties()
                    .iter()
                    .map(|p| (p.key().to_string(), p.val_str().to_string()))
                    .collect();
                if let Some(item) = collect(&txt) {
                    out.push(item);
                }
            }
        }
        let _ = self.daemon.stop_browse(&self.service_type);
        Ok(out)
    }

    /// Withdraw the advertisement and stop the daemon.
    pub fn shutdown(&self) {
        let _ = self.daemon.unregister(&self.fullname());
        if let Err(e) = self.daemon.shutdown() {
            warn!("mdns daemon shutdown failed: {e}");
        }
    }
}

#[async_trait]
impl Coordination for Coordinator {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn update_status(
        &self,
        status: AgentStatus,
        task: &str,
        action: &str,
    ) -> Result<(), CoordError> {
        {
            let mut state = self.state.lock().unwrap();
            state.0.update(status, task, action);
        }
        self.republish()
    }

    async fn send_message(
        &self,
        to: &str,
        kind: &str,
        content: &str,
    ) -> Result<(), CoordError> {
        {
            let mut state = self.state.lock().unwrap();
            let from = state.0.agent_id.clone();
            state.1.push(AgentMessage::new(from, to, kind, content));
        }
        self.republish()
    }

    async fn discover_agents(
        &self,
        _timeout: Duration,
    ) -> Result<Vec<AgentStatusRecord>, CoordError> {
        let own = self.agent_id.clone();
        self.browse_peers(move |txt| {
            parse_record(txt).filter(|record| record.agent_id != own)
        })
        .await
    }

    async fn discover_messages(
        &self,
        _timeout: Duration,
    ) -> Result<Vec<AgentMessage>, CoordError> {
        let batches = self.browse_peers(|txt| Some(parse_messages(txt))).await?;
        let mut seen = self.seen.lock().unwrap();
        let mut out = Vec::new();
        for msg in batches.into_iter().flatten() {
            if msg.to != "*" && msg.to != self.agent_id {
                continue;
            }
            if msg.from == self.agent_id {
                continue;
            }
            if seen.insert(msg.dedupe_key()) {
                out.push(msg);
            }
        }
        Ok(out)
    }
}

/// One-shot peer listing without registering an advertisement of our own.
/// Used by the CLI `agents` subcommand.
pub async fn browse_agents(
    cfg: &CoordinationConfig,
) -> Result<Vec<AgentStatusRecord>, CoordError> {
    let service_type = format!("_{}._tcp.local.", cfg.service_name);
    let daemon = ServiceDaemon::new()?;
    let receiver = daemon
        .browse(&service_type)
        .map_err(|e| CoordError::BrowseFailed(e.to_string()))?;

    let mut out = Vec::new();
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(cfg.browse_timeout_secs);
    loop {
        let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
            Ok(Ok(ev)) => ev,
            Ok(Err(_)) | Err(_) => break,
        };
        if let ServiceEvent::ServiceResolved(info) = event {
            let txt: HashMap<String, String> = info
                .get_properties()
                .iter()
                .map(|p| (p.key().to_string(), p.val_str().to_string()))
                .collect();
            if let Some(record) = parse_record(&txt) {
                out.push(record);
            }
        }
    }
    let _ = daemon.stop_browse(&service_type);
    let _ = daemon.shutdown();
    Ok(out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_combines_prefix_and_agent_id() {
        let cfg = CoordinationConfig::default();
        // Pure string computation mirrored here so a rename is caught even
        // on machines where the mdns daemon cannot start.
        let instance = format!("{}-{}", cfg.instance_prefix, "agent-7");
        assert_eq!(instance, "saturn-agent-7");
        let service_type = format!("_{}._tcp.local.", cfg.service_name);
        assert_eq!(service_type, "_saturn-agent._tcp.local.");
    }
}
