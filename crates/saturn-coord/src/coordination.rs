// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The coordination seam.
//!
//! [`Coordination`] is what the agent loop and the coordination tools are
//! written against; [`Coordinator`](crate::Coordinator) implements it over
//! mDNS, and [`InMemoryCoordination`] implements it over a shared
//! in-process bus for tests and single-process multi-agent runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::warn;

use crate::error::CoordError;
use crate::status::{AgentMessage, AgentStatus, AgentStatusRecord, MessageRing};

#[async_trait]
pub trait Coordination: Send + Sync {
    fn agent_id(&self) -> &str;

    /// Publish a status change.  Single-writer per agent.
    async fn update_status(
        &self,
        status: AgentStatus,
        task: &str,
        action: &str,
    ) -> Result<(), CoordError>;

    /// Append a directed message to the ring and republish.
    async fn send_message(&self, to: &str, kind: &str, content: &str)
        -> Result<(), CoordError>;

    /// Broadcast to every peer (`to = "*"`).
    async fn broadcast(&self, kind: &str, content: &str) -> Result<(), CoordError> {
        self.send_message("*", kind, content).await
    }

    /// Browse for peers and return their status records (self excluded).
    async fn discover_agents(
        &self,
        timeout: Duration,
    ) -> Result<Vec<AgentStatusRecord>, CoordError>;

    /// Collect peer messages addressed to this agent (or broadcast),
    /// dropping own messages and anything already delivered.
    async fn discover_messages(
        &self,
        timeout: Duration,
    ) -> Result<Vec<AgentMessage>, CoordError>;
}

/// Handle for the background message listener.
pub struct ListenerHandle {
    stop: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl ListenerHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}

/// Poll [`Coordination::discover_messages`] every `interval` and hand each
/// message to `handler`.  Delivery is best-effort and unordered across
/// peers; handlers must be idempotent.
pub fn spawn_listener<F>(
    coord: Arc<dyn Coordination>,
    interval: Duration,
    handler: F,
) -> ListenerHandle
where
    F: Fn(AgentMessage) + Send + Sync + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tick.tick() => {}
            }
            match coord.discover_messages(interval).await {
                Ok(messages) => {
                    for msg in messages {
                        handler(msg);
                    }
                }
                Err(e) => warn!("message poll failed: {e}"),
            }
        }
    });
    ListenerHandle {
        stop: stop_tx,
        handle,
    }
}

// ─── In-memory implementation ────────────────────────────────────────────────

/// Shared in-process bus: agent-id → (status record, message ring).
pub type CoordBus = Arc<Mutex<HashMap<String, (AgentStatusRecord, MessageRing)>>>;

pub fn new_bus() -> CoordBus {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Coordination over a shared in-process map instead of the network.
pub struct InMemoryCoordination {
    agent_id: String,
    bus: CoordBus,
    seen: Mutex<HashSet<String>>,
}

impl InMemoryCoordination {
    pub fn new(agent_id: impl Into<String>, bus: CoordBus) -> Self {
        let agent_id = agent_id.into();
        bus.lock().unwrap().insert(
            agent_id.clone(),
            (AgentStatusRecord::new(&agent_id), MessageRing::new()),
        );
        Self {
            agent_id,
            bus,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Coordination for InMemoryCoordination {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn update_status(
        &self,
        status: AgentStatus,
        task: &str,
        action: &str,
    ) -> Result<(), CoordError> {
        let mut bus = self.bus.lock().unwrap();
        let entry = bus
            .entry(self.agent_id.clone())
            .or_insert_with(|| (AgentStatusRecord::new(&self.agent_id), MessageRing::new()));
        entry.0.update(status, task, action);
        Ok(())
    }

    async fn send_message(
        &self,
        to: &str,
        kind: &str,
        content: &str,
    ) -> Result<(), CoordError> {
        let msg = AgentMessage::new(&self.agent_id, to, kind, content);
        let mut bus = self.bus.lock().unwrap();
        let entry = bus
            .entry(self.agent_id.clone())
            .or_insert_with(|| (AgentStatusRecord::new(&self.agent_id), MessageRing::new()));
        entry.1.push(msg);
        Ok(())
    }

    async fn discover_agents(
        &self,
        _timeout: Duration,
    ) -> Result<Vec<AgentStatusRecord>, CoordError> {
        let bus = self.bus.lock().unwrap();
        Ok(bus
            .iter()
            .filter(|(id, _)| *id != &self.agent_id)
            .map(|(_, (record, _))| record.clone())
            .collect())
    }

    async fn discover_messages(
        &self,
        _timeout: Duration,
    ) -> Result<Vec<AgentMessage>, CoordError> {
        let bus = self.bus.lock().unwrap();
        let mut seen = self.seen.lock().unwrap();
        let mut out = Vec::new();
        for (id, (_, ring)) in bus.iter() {
            if id == &self.agent_id {
                continue;
            }
            for msg in ring.iter() {
                if msg.to != "*" && msg.to != self.agent_id {
                    continue;
                }
                if msg.from == self.agent_id {
                    continue;
                }
                if seen.insert(msg.dedupe_key()) {
                    out.push(msg.clone());
                }
            }
        }
        Ok(out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
