// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! TXT payload encode/decode for agent advertisements.
//!
//! Layout (key order is not significant on the wire):
//!
//! ```text
//! agent_id=<id>
//! status=<idle|working|stopped>
//! task=<current task>
//! action=<last action>
//! updated=<unix-seconds>
//! msg0=<json> … msgK=<json>      (K < 5)
//! ```
//!
//! Consumers must not rely on a message keeping its `msgN` index between
//! publications — the ring may have advanced.

use std::collections::HashMap;

use tracing::warn;

use crate::status::{AgentMessage, AgentStatusRecord, MessageRing};

/// Build the TXT key=value map for one advertisement.
pub fn encode_txt(record: &AgentStatusRecord, ring: &MessageRing) -> HashMap<String, String> {
    let mut txt = HashMap::new();
    txt.insert("agent_id".into(), record.agent_id.clone());
    txt.insert("status".into(), record.status.to_string());
    txt.insert("task".into(), record.task.clone());
    txt.insert("action".into(), record.action.clone());
    txt.insert("updated".into(), record.updated.to_string());
    for (i, msg) in ring.iter().enumerate() {
        match serde_json::to_string(msg) {
            Ok(json) => {
                txt.insert(format!("msg{i}"), json);
            }
            Err(e) => warn!("skipping unencodable ring message: {e}"),
        }
    }
    txt
}

/// Parse a peer's TXT map into a status record.  Returns `None` when the
/// mandatory `agent_id` key is absent.
pub fn parse_record(txt: &HashMap<String, String>) -> Option<AgentStatusRecord> {
    let agent_id = txt.get("agent_id")?.clone();
    let status = txt
        .get("status")
        .and_then(|s| s.parse().ok())
        .unwrap_or(crate::status::AgentStatus::Idle);
    Some(AgentStatusRecord {
        agent_id,
        status,
        task: txt.get("task").cloned().unwrap_or_default(),
        action: txt.get("action").cloned().unwrap_or_default(),
        updated: txt
            .get("updated")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    })
}

/// Extract every `msgN=` entry, ordered by index.  Undecodable entries are
/// skipped.
pub fn parse_messages(txt: &HashMap<String, String>) -> Vec<AgentMessage> {
    let mut indexed: Vec<(usize, AgentMessage)> = txt
        .iter()
        .filter_map(|(k, v)| {
            let idx: usize = k.strip_prefix("msg")?.parse().ok()?;
            match serde_json::from_str(v) {
                Ok(msg) => Some((idx, msg)),
                Err(e) => {
                    warn!(key = %k, "undecodable ring message: {e}");
                    None
                }
            }
        })
        .collect();
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, m)| m).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
