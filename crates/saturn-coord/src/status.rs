// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// The message ring bound.  Five entries keep one TXT payload small enough
/// for a single advertisement.
pub const RING_CAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "working" => Ok(AgentStatus::Working),
            "stopped" => Ok(AgentStatus::Stopped),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// One agent's advertised state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    pub task: String,
    pub action: String,
    /// Unix seconds; monotone non-decreasing under single-writer rules.
    pub updated: i64,
}

impl AgentStatusRecord {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Idle,
            task: String::new(),
            action: String::new(),
            updated: chrono::Utc::now().timestamp(),
        }
    }

    /// Apply a status change, keeping `updated` monotone.
    pub fn update(&mut self, status: AgentStatus, task: &str, action: &str) {
        self.status = status;
        self.task = task.to_string();
        self.action = action.to_string();
        self.updated = self.updated.max(chrono::Utc::now().timestamp());
    }
}

/// A directed or broadcast message between agents.  `to = "*"` broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Unix seconds at send time.
    pub ts: i64,
}

impl AgentMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            content: content.into(),
            ts: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == "*"
    }

    /// Stable identity for at-most-once delivery across browse refreshes.
    pub fn dedupe_key(&self) -> String {
        format!("{}|{}|{}|{}|{}", self.from, self.to, self.kind, self.ts, self.content)
    }
}

/// Bounded FIFO of the most recent messages, sized to fit one TXT payload.
#[derive(Debug, Clone, Default)]
pub struct MessageRing {
    items: VecDeque<AgentMessage>,
}

impl MessageRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, evicting the oldest entry when the ring is full.
    pub fn push(&mut self, msg: AgentMessage) {
        if self.items.len() == RING_CAP {
            self.items.pop_front();
        }
        self.items.push_back(msg);
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &AgentMessage> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for s in [AgentStatus::Idle, AgentStatus::Working, AgentStatus::Stopped] {
            let parsed: AgentStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("bogus".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn record_update_sets_fields() {
        let mut r = AgentStatusRecord::new("x");
        r.update(AgentStatus::Working, "build", "compiling");
        assert_eq!(r.status, AgentStatus::Working);
        assert_eq!(r.task, "build");
        assert_eq!(r.action, "compiling");
    }

    #[test]
    fn record_updated_is_monotone() {
        let mut r = AgentStatusRecord::new("x");
        r.updated = i64::MAX - 10;
        r.update(AgentStatus::Idle, "", "");
        assert_eq!(r.updated, i64::MAX - 10, "clock regression must not lower updated");
    }

    #[test]
    fn message_broadcast_detection() {
        assert!(AgentMessage::new("a", "*", "status", "x").is_broadcast());
        assert!(!AgentMessage::new("a", "b", "status", "x").is_broadcast());
    }

    #[test]
    fn message_serializes_kind_as_type() {
        let m = AgentMessage::new("a", "*", "status", "compiling");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"type\":\"status\""), "{json}");
        let back: AgentMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, "status");
    }

    #[test]
    fn ring_holds_at_most_five() {
        let mut ring = MessageRing::new();
        for i in 0..8 {
            ring.push(AgentMessage::new("a", "*", "n", i.to_string()));
        }
        assert_eq!(ring.len(), RING_CAP);
        // Oldest three were evicted.
        let contents: Vec<&str> = ring.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4", "5", "6", "7"]);
    }

    #[test]
    fn ring_preserves_fifo_order() {
        let mut ring = MessageRing::new();
        ring.push(AgentMessage::new("a", "*", "n", "first"));
        ring.push(AgentMessage::new("a", "*", "n", "second"));
        let contents: Vec<&str> = ring.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn dedupe_key_distinguishes_distinct_messages() {
        let a = AgentMessage::new("x", "*", "status", "one");
        let b = AgentMessage::new("x", "*", "status", "two");
        assert_ne!(a.dedupe_key(), b.dedupe_key());
        assert_eq!(a.dedupe_key(), a.clone().dedupe_key());
    }
}
