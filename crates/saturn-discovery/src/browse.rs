// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Browse `_<service>._tcp.local.` and produce endpoint descriptors.
//!
//! Two transport strategies are layered: the native mDNS resolver
//! (`mdns-sd` daemon) is preferred; when it errors or yields nothing, the
//! platform `dns-sd` tool is shelled out to as a last resort — a browse
//! pass to recover instance names, then a per-instance resolve pass for
//! host/port/TXT.  The shell parser tolerates CRLF and header noise.

use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::endpoint::EndpointDescriptor;
use crate::error::DiscoveryError;

#[derive(Clone)]
pub struct Discoverer {
    /// Full DNS-SD type, e.g. `_saturn._tcp.local.`
    service_type: String,
    timeout: Duration,
    legacy_fallback: bool,
}

impl Discoverer {
    pub fn new(service_name: &str, timeout: Duration) -> Self {
        Self {
            service_type: format!("_{service_name}._tcp.local."),
            timeout,
            legacy_fallback: true,
        }
    }

    pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
        self.legacy_fallback = enabled;
        self
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Browse for the configured timeout and return descriptors sorted
    /// ascending by priority.
    ///
    /// Fails with [`DiscoveryError::NoServicesFound`] when both the native
    /// and the legacy strategy come back empty.
    pub async fn discover(&self) -> Result<Vec<EndpointDescriptor>, DiscoveryError> {
        let mut endpoints = match self.browse_native().await {
            Ok(eps) => eps,
            Err(e) => {
                warn!("native mdns browse failed: {e}");
                Vec::new()
            }
        };

        if endpoints.is_empty() && self.legacy_fallback {
            debug!("native browse empty; trying dns-sd fallback");
            endpoints = self.browse_legacy().await.unwrap_or_default();
        }

        if endpoints.is_empty() {
            return Err(DiscoveryError::NoServicesFound);
        }

        endpoints.sort_by_key(|e| e.priority);
        Ok(endpoints)
    }

    /// Strategy 1: native resolver via the mdns-sd daemon.
    async fn browse_native(&self) -> Result<Vec<EndpointDescriptor>, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;
        let receiver = daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;

        let mut found: HashMap<String, EndpointDescriptor> = HashMap::new();
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(ev)) => ev,
                // Channel closed or browse window elapsed.
                Ok(Err(_)) | Err(_) => break,
            };
            if let ServiceEvent::ServiceResolved(info) = event {
                let instance =
                    instance_from_fullname(info.get_fullname(), &self.service_type);
                let host = pick_host(info.get_addresses(), info.get_hostname());
                let txt: HashMap<String, String> = info
                    .get_properties()
                    .iter()
                    .map(|p| (p.key().to_string(), p.val_str().to_string()))
                    .collect();
                debug!(instance = %instance, host = %host, port = info.get_port(), "resolved service");
                found.insert(
                    instance.clone(),
                    EndpointDescriptor::from_txt(instance, host, info.get_port(), &txt),
                );
            }
        }

        let _ = daemon.stop_browse(&self.service_type);
        let _ = daemon.shutdown();
        Ok(found.into_values().collect())
    }

    /// Strategy 2: shell out to the platform `dns-sd` tool.
    async fn browse_legacy(&self) -> Result<Vec<EndpointDescriptor>, DiscoveryError> {
        // dns-sd wants the bare type without the .local. suffix.
        let bare_type = self
            .service_type
            .trim_end_matches('.')
            .trim_end_matches(".local")
            .to_string();

        let browse_out = run_bounded(
            Command::new("dns-sd").args(["-B", &bare_type]),
            self.timeout,
        )
        .await?;
        let instances = parse_browse_output(&browse_out, &bare_type);
        if instances.is_empty() {
            return Ok(Vec::new());
        }

        let mut endpoints = Vec::new();
        for instance in instances {
            let resolve_out = run_bounded(
                Command::new("dns-sd").args(["-L", &instance, &bare_type]),
                self.timeout,
            )
            .await?;
            match parse_resolve_output(&resolve_out) {
                Some((host, port, txt)) => {
                    endpoints.push(EndpointDescriptor::from_txt(&instance, host, port, &txt));
                }
                None => {
                    warn!(instance = %instance, "dns-sd resolve produced no usable output");
                    return Err(DiscoveryError::ResolveFailed(instance));
                }
            }
        }
        Ok(endpoints)
    }
}

/// Prefer an IPv4 address, then any address, then the SRV hostname.
fn pick_host<'a>(
    addresses: impl IntoIterator<Item = &'a IpAddr>,
    hostname: &str,
) -> String {
    let mut first: Option<&IpAddr> = None;
    for addr in addresses {
        if addr.is_ipv4() {
            return addr.to_string();
        }
        first.get_or_insert(addr);
    }
    match first {
        Some(addr) => addr.to_string(),
        None => hostname.trim_end_matches('.').to_string(),
    }
}

/// `my beacon._saturn._tcp.local.` → `my beacon`
fn instance_from_fullname(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

/// Run a command, capture stdout for at most `timeout`, then kill it.
/// `dns-sd` streams until interrupted, so hitting the timeout is the
/// normal exit path.
async fn run_bounded(cmd: &mut Command, timeout: Duration) -> Result<String, DiscoveryError> {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DiscoveryError::Io(format!("spawning dns-sd: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| DiscoveryError::Io("dns-sd stdout unavailable".into()))?;

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(timeout, stdout.read_to_end(&mut buf)).await;
    let _ = child.kill().await;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extract instance names from `dns-sd -B` output.
///
/// Expected data lines look like
/// `12:00:00.123  Add  3  4 local.  _saturn._tcp.  my-beacon`
/// but header, timestamp, and DATE noise lines are interleaved, and line
/// endings may be CRLF.
fn parse_browse_output(output: &str, bare_type: &str) -> Vec<String> {
    let type_token = format!("{bare_type}.");
    let mut instances = Vec::new();
    for raw in output.lines() {
        let line = raw.trim_end_matches('\r');
        if !line.contains(" Add ") && !line.contains("\tAdd\t") {
            continue;
        }
        // The instance name is everything after the service-type column and
        // may itself contain spaces.
        let after = match line.find(&type_token) {
            Some(pos) => &line[pos + type_token.len()..],
            None => match line.find(bare_type) {
                Some(pos) => &line[pos + bare_type.len()..],
                None => continue,
            },
        };
        let name = after.trim();
        if !name.is_empty() && !instances.iter().any(|n| n == name) {
            instances.push(name.to_string());
        }
    }
    instances
}

/// Extract `(host, port, txt)` from `dns-sd -L` output.
///
/// The reachability line carries `… can be reached at host:port (interface N)`;
/// subsequent indented lines carry whitespace-separated `key=value` TXT pairs.
fn parse_resolve_output(output: &str) -> Option<(String, u16, HashMap<String, String>)> {
    let mut host_port: Option<(String, u16)> = None;
    let mut txt = HashMap::new();

    for raw in output.lines() {
        let line = raw.trim_end_matches('\r');
        if let Some(pos) = line.find("can be reached at ") {
            let rest = line[pos + "can be reached at ".len()..].trim();
            let addr = rest.split_whitespace().next()?;
            let (host, port) = addr.rsplit_once(':')?;
            let port: u16 = port.trim_end_matches('.').parse().ok()?;
            host_port = Some((host.trim_end_matches('.').to_string(), port));
        } else if host_port.is_some() && line.starts_with(char::is_whitespace) {
            for pair in line.split_whitespace() {
                if let Some((k, v)) = pair.split_once('=') {
                    txt.insert(k.to_string(), v.to_string());
                }
            }
        }
    }

    host_port.map(|(h, p)| (h, p, txt))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
